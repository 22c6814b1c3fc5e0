//! Bootstrap / scheduler: wires every background worker for whichever
//! mode the config selects, and hands back a handle the embedding CMS
//! binding uses to feed document events in and wait for shutdown.

use std::sync::Arc;
use std::time::Duration;

use offsync_bus::{BackoffPolicy, BusConsumer, BusProducer, KafkaConsumer, KafkaProducer};
use offsync_config::OffsyncConfig;
use offsync_connectivity::{ConnectivityMonitor, PeerLivenessSupervisor, ReconnectCallback};
use offsync_interceptor::{scoped_origin, LifecycleInterceptor, Origin, PushDebouncer, Role};
use offsync_media::MediaMirror;
use offsync_resolver::{ContentRepository, MergeStrategy, Resolver};
use offsync_store::{DeadLetterResolution, Store};
use offsync_types::{Mode, PeerId};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cleanup::CleanupRegistry;
use crate::shutdown::Shutdown;

pub struct RunningDaemon<C: ContentRepository> {
    pub resolver: Arc<Resolver<C>>,
    pub interceptor: Arc<LifecycleInterceptor>,
    pub producer: Arc<dyn BusProducer>,
    pub connectivity: Option<Arc<ConnectivityMonitor>>,
    pub peers: Option<Arc<PeerLivenessSupervisor>>,
    pub media: Option<Arc<MediaMirror>>,
    pub store: Store,
    mode: Mode,
    shutdown: Shutdown,
    cleanup: CleanupRegistry,
    tasks: Vec<JoinHandle<()>>,
}

impl<C: ContentRepository + 'static> RunningDaemon<C> {
    /// Resolves a dead letter. `Requeued` re-publishes the original
    /// payload through this daemon's producer (to the peers, from
    /// master; to master, from a replica) before marking it resolved;
    /// `Discarded` just marks it resolved.
    pub async fn resolve_dead_letter(&self, id: i64, resolution: DeadLetterResolution) -> anyhow::Result<()> {
        if resolution == DeadLetterResolution::Requeued {
            let letter = self.store.dead_letters().get(id).await?;
            let message: offsync_types::SyncMessage = serde_json::from_str(&letter.payload)?;
            match self.mode {
                Mode::Master => self.producer.send_to_ships(&message).await?,
                Mode::Replica => self.producer.send_to_master(&message).await?,
            }
        }
        self.store.dead_letters().resolve(id, resolution).await?;
        Ok(())
    }

    /// Waits for SIGINT/SIGTERM (or an externally-triggered shutdown),
    /// then runs every registered cleanup function in order.
    pub async fn wait_for_shutdown(mut self) {
        let signal_shutdown = self.shutdown.clone();
        let signal_task = tokio::spawn(async move { signal_shutdown.wait_for_signal().await });

        let mut rx = self.shutdown.subscribe();
        let _ = rx.changed().await;
        signal_task.abort();

        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.cleanup.run_all().await;
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }
}

/// Wires every worker for `config.mode` and returns a handle. The CMS
/// binding is expected to call `interceptor.on_document_event(..)`
/// from its own document middleware hooks.
pub async fn bootstrap<C: ContentRepository + 'static>(
    config: OffsyncConfig,
    store: Store,
    content: C,
) -> anyhow::Result<RunningDaemon<C>> {
    config.validate().map_err(anyhow::Error::from)?;

    let shutdown = Shutdown::new();
    let mut cleanup = CleanupRegistry::new();
    let mut tasks = Vec::new();
    let resolver = Arc::new(Resolver::new(store.clone(), content, MergeStrategy::FieldFill));

    let media = if config.media.enabled {
        let master_store = Arc::new(offsync_media::S3ObjectStore::connect(&config.media.master_store));
        let local_store = Arc::new(offsync_media::S3ObjectStore::connect(&config.media.local_store));
        let mirror = Arc::new(MediaMirror::new(master_store, local_store, &config.media));
        mirror.ensure_local_bucket().await.ok();
        if let Err(err) = mirror.full_sync().await {
            warn!(error = %err, "initial full media sync failed");
        }
        Some(mirror)
    } else {
        None
    };

    let (interceptor, producer, connectivity, peers) = match config.mode {
        Mode::Replica => {
            bootstrap_replica(&config, store.clone(), resolver.clone(), &shutdown, &mut cleanup, &mut tasks).await?
        }
        Mode::Master => {
            bootstrap_master(&config, store.clone(), resolver.clone(), &shutdown, &mut cleanup, &mut tasks).await?
        }
    };

    Ok(RunningDaemon {
        resolver,
        interceptor,
        producer,
        connectivity,
        peers,
        media,
        store,
        mode: config.mode,
        shutdown,
        cleanup,
        tasks,
    })
}

type ModeHandles = (
    Arc<LifecycleInterceptor>,
    Arc<dyn BusProducer>,
    Option<Arc<ConnectivityMonitor>>,
    Option<Arc<PeerLivenessSupervisor>>,
);

async fn bootstrap_replica<C: ContentRepository + 'static>(
    config: &OffsyncConfig,
    store: Store,
    resolver: Arc<Resolver<C>>,
    shutdown: &Shutdown,
    cleanup: &mut CleanupRegistry,
    tasks: &mut Vec<JoinHandle<()>>,
) -> anyhow::Result<ModeHandles> {
    let ship_id: PeerId = config
        .ship_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("replica mode requires shipId"))?;

    let backoff = BackoffPolicy::default();
    let bus_config = config.bus.clone();
    let producer: Arc<dyn BusProducer> = Arc::new(
        backoff
            .retry(|| {
                let bus_config = bus_config.clone();
                async move { KafkaProducer::connect(&bus_config) }
            })
            .await?,
    );

    let bus_config = config.bus.clone();
    let topic = config.bus.topics.master_updates.clone();
    let group_id = format!("offsync-replica-{ship_id}");
    let consumer: Arc<dyn BusConsumer> = Arc::new(
        backoff
            .retry(|| {
                let bus_config = bus_config.clone();
                let topic = topic.clone();
                let group_id = group_id.clone();
                async move { KafkaConsumer::connect(&bus_config, &topic, &group_id) }
            })
            .await?,
    );

    let push = PushDebouncer::spawn(
        Duration::from_millis(config.sync.debounce_ms),
        {
            let producer = producer.clone();
            let store = store.clone();
            let ship_id = ship_id.clone();
            move || {
                let producer = producer.clone();
                let store = store.clone();
                let ship_id = ship_id.clone();
                async move { drain_replica_queue(&store, producer.as_ref(), &ship_id).await }
            }
        },
    );

    let interceptor = Arc::new(LifecycleInterceptor::new(
        store.clone(),
        config.content_types.clone(),
        Role::Replica { peer_id: ship_id.clone(), push },
    ));

    let monitor = Arc::new(ConnectivityMonitor::new(producer.clone(), ship_id.clone(), None));
    monitor.start_monitoring(Duration::from_millis(config.sync.connectivity_check_interval_ms));
    {
        let monitor_for_cleanup = monitor.clone();
        cleanup.register(move || {
            let monitor_for_cleanup = monitor_for_cleanup.clone();
            async move { monitor_for_cleanup.shutdown() }
        });
    }

    monitor.register_reconnect_callback(Arc::new(ReplicaReconnectHandler {
        store: store.clone(),
        producer: producer.clone(),
        ship_id: ship_id.clone(),
    }));

    tasks.push(spawn_consumer_loop(
        store.clone(),
        resolver,
        consumer,
        "master".to_string(),
        Origin::FromMaster,
        None,
        shutdown.subscribe(),
    ));

    tasks.push(spawn_heartbeat_loop(producer.clone(), ship_id.clone(), shutdown.subscribe()));

    tasks.push(spawn_auto_push_loop(
        store.clone(),
        producer.clone(),
        ship_id,
        Duration::from_millis(config.sync.auto_push_interval_ms),
        shutdown.subscribe(),
    ));

    Ok((interceptor, producer, Some(monitor), None))
}

async fn bootstrap_master<C: ContentRepository + 'static>(
    config: &OffsyncConfig,
    store: Store,
    resolver: Arc<Resolver<C>>,
    shutdown: &Shutdown,
    _cleanup: &mut CleanupRegistry,
    tasks: &mut Vec<JoinHandle<()>>,
) -> anyhow::Result<ModeHandles> {
    let backoff = BackoffPolicy::default();
    let bus_config = config.bus.clone();
    let producer: Arc<dyn BusProducer> = Arc::new(
        backoff
            .retry(|| {
                let bus_config = bus_config.clone();
                async move { KafkaProducer::connect(&bus_config) }
            })
            .await?,
    );

    let bus_config = config.bus.clone();
    let topic = config.bus.topics.ship_updates.clone();
    let consumer: Arc<dyn BusConsumer> = Arc::new(
        backoff
            .retry(|| {
                let bus_config = bus_config.clone();
                let topic = topic.clone();
                async move { KafkaConsumer::connect(&bus_config, &topic, "offsync-master") }
            })
            .await?,
    );

    let interceptor = Arc::new(LifecycleInterceptor::new(
        store.clone(),
        config.content_types.clone(),
        Role::Master { producer: producer.clone() },
    ));

    let peers = Arc::new(PeerLivenessSupervisor::new(store.peers()));
    peers.spawn_janitor();

    tasks.push(spawn_consumer_loop(
        store.clone(),
        resolver,
        consumer,
        "ship".to_string(),
        Origin::FromShip,
        Some(peers.clone()),
        shutdown.subscribe(),
    ));

    tasks.push(spawn_broadcast_drainer(
        store.clone(),
        producer.clone(),
        Duration::from_secs(30),
        shutdown.subscribe(),
    ));

    tasks.push(spawn_janitor(store.clone(), shutdown.subscribe()));

    Ok((interceptor, producer, None, Some(peers)))
}

struct ReplicaReconnectHandler {
    store: Store,
    producer: Arc<dyn BusProducer>,
    ship_id: PeerId,
}

#[async_trait::async_trait]
impl ReconnectCallback for ReplicaReconnectHandler {
    async fn on_reconnect(&self) {
        // Give a freshly reconnected link a moment to stabilize before
        // pushing, rather than racing a flapping connection.
        tokio::time::sleep(Duration::from_secs(3)).await;
        drain_replica_queue(&self.store, self.producer.as_ref(), &self.ship_id).await;
    }
}

async fn drain_replica_queue(store: &Store, producer: &dyn BusProducer, ship_id: &PeerId) {
    if !producer.is_connected() {
        return;
    }
    let queue = store.replica_queue();
    let pending = match queue.get_pending(50).await {
        Ok(rows) => rows,
        Err(err) => {
            warn!(error = %err, "failed to read pending replica queue entries");
            return;
        }
    };

    for entry in pending {
        let data = match entry.parsed_data() {
            Ok(data) => data,
            Err(err) => {
                warn!(error = %err, "corrupt queue entry payload, marking failed");
                let _ = queue.mark_failed(entry.id, &err.to_string()).await;
                continue;
            }
        };

        let message = offsync_types::SyncMessage {
            message_id: offsync_types::SyncMessage::make_message_id(
                ship_id,
                chrono::Utc::now().timestamp_millis(),
                &entry.content_id,
            ),
            ship_id: ship_id.clone(),
            timestamp: chrono::Utc::now(),
            operation: entry.parsed_operation(),
            content_type: entry.content_type.clone(),
            content_id: entry.content_id.clone(),
            version: entry.local_version as u64,
            data,
            locale: entry.locale.clone(),
            file_records: None,
        };

        match producer.send_to_master(&message).await {
            Ok(()) => {
                if let Err(err) = queue.mark_synced(entry.id).await {
                    warn!(error = %err, "failed to mark queue entry synced");
                }
            }
            Err(err) => {
                warn!(error = %err, id = entry.id, "failed to push queue entry");
                let _ = queue.mark_failed(entry.id, &err.to_string()).await;
            }
        }
    }
}

fn spawn_consumer_loop<C: ContentRepository + 'static>(
    store: Store,
    resolver: Arc<Resolver<C>>,
    consumer: Arc<dyn BusConsumer>,
    peer_label: PeerId,
    origin: Origin,
    peers: Option<Arc<PeerLivenessSupervisor>>,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                delivery = consumer.recv() => {
                    match delivery {
                        Ok(Some(d)) => {
                            if let Some(peers) = &peers {
                                if let Err(err) = peers.record_activity(&d.message.ship_id).await {
                                    debug!(error = %err, "failed to record peer activity");
                                }
                            }
                            let dedup = store.dedup();
                            let seen = dedup.seen(&d.message.message_id).await.unwrap_or(false);
                            if seen {
                                debug!(message_id = %d.message.message_id, "duplicate delivery, skipping apply");
                            } else {
                                let source = d.message.ship_id.clone();
                                let outcome = scoped_origin(origin, resolver.apply(&d.message, &source)).await;
                                match outcome {
                                    Ok(_) => {
                                        let _ = dedup.record(&d.message.message_id).await;
                                    }
                                    Err(err) => {
                                        warn!(error = %err, "apply failed, sending to dead-letter store");
                                        let payload = serde_json::to_string(&d.message)
                                            .unwrap_or_else(|_| "{}".to_string());
                                        let _ = store
                                            .dead_letters()
                                            .append(&d.message.message_id, &payload, &err.to_string())
                                            .await;
                                    }
                                }
                            }
                            if let Err(err) = consumer.ack(d).await {
                                error!(error = %err, "failed to ack delivery");
                            }
                        }
                        Ok(None) => {
                            debug!(peer_label = %peer_label, "consumer closed");
                            break;
                        }
                        Err(err) => {
                            warn!(error = %err, "consumer recv error");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!(peer_label = %peer_label, "consumer loop shutting down");
                    break;
                }
            }
        }
    })
}

fn spawn_heartbeat_loop(
    producer: Arc<dyn BusProducer>,
    peer_id: PeerId,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = producer.send_heartbeat(&peer_id).await {
                        debug!(error = %err, "heartbeat send failed");
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }
    })
}

fn spawn_auto_push_loop(
    store: Store,
    producer: Arc<dyn BusProducer>,
    ship_id: PeerId,
    interval: Duration,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    drain_replica_queue(&store, producer.as_ref(), &ship_id).await;
                }
                _ = shutdown_rx.changed() => break,
            }
        }
    })
}

fn spawn_broadcast_drainer(
    store: Store,
    producer: Arc<dyn BusProducer>,
    interval: Duration,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !producer.is_connected() {
                        continue;
                    }
                    let queue = store.master_queue();
                    let pending = match queue.get_pending(50).await {
                        Ok(rows) => rows,
                        Err(err) => {
                            warn!(error = %err, "failed to read master broadcast queue");
                            continue;
                        }
                    };
                    for entry in pending {
                        let data = entry.parsed_data().unwrap_or(None);
                        let message = offsync_types::SyncMessage {
                            message_id: offsync_types::SyncMessage::make_message_id(
                                "master",
                                chrono::Utc::now().timestamp_millis(),
                                &entry.content_id,
                            ),
                            ship_id: "master".to_string(),
                            timestamp: chrono::Utc::now(),
                            operation: entry.parsed_operation(),
                            content_type: entry.content_type.clone(),
                            content_id: entry.content_id.clone(),
                            version: entry.local_version as u64,
                            data,
                            locale: entry.locale.clone(),
                            file_records: None,
                        };
                        match producer.send_to_ships(&message).await {
                            Ok(()) => { let _ = queue.mark_synced(entry.id).await; }
                            Err(err) => { let _ = queue.mark_failed(entry.id, &err.to_string()).await; }
                        }
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }
    })
}

/// The 5-minute retention janitor (master): dedup ledger, dead-letter
/// store, both outbound queues. Offline-peer flipping is its own
/// janitor, started separately via `PeerLivenessSupervisor::spawn_janitor`.
fn spawn_janitor(
    store: Store,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(5 * 60));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = store.dedup().prune(30).await {
                        debug!(error = %err, "janitor: dedup prune failed");
                    }
                    if let Err(err) = store.dead_letters().prune_resolved(30).await {
                        debug!(error = %err, "janitor: dead-letter prune failed");
                    }
                    if let Err(err) = store.replica_queue().prune(30).await {
                        debug!(error = %err, "janitor: replica queue prune failed");
                    }
                    if let Err(err) = store.master_queue().prune(30).await {
                        debug!(error = %err, "janitor: master queue prune failed");
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }
    })
}
