//! Kubernetes resource watchers.
//!
//! Turns the list+watch stream of `kube_runtime::watcher` into add/update/delete
//! notifications and replays every live object as an add on a fixed period,
//! so a missed event or drift on the Grafana side heals on the next resync.
//!
//! Notifications are handed to the handler one at a time and awaited before
//! the next event is read: a watcher never runs its handler concurrently.

use crate::config::WatchConfig;
use crate::error::ControllerError;
use futures::{Stream, StreamExt};
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::{WatchStreamExt, watcher};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A change to a watched object.
///
/// `Added` means "ensure this exists and is current", it is also what the
/// initial listing, relists and periodic resyncs deliver.
#[derive(Debug)]
pub enum Notification<K> {
    Added(Arc<K>),
    Updated { old: Arc<K>, new: Arc<K> },
    Deleted(Arc<K>),
}

impl<K: Resource> Notification<K> {
    /// The current state of the object (the new one for updates)
    pub fn object(&self) -> &K {
        match self {
            Notification::Added(obj) | Notification::Deleted(obj) => obj,
            Notification::Updated { new, .. } => new,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Notification::Added(_) => "added",
            Notification::Updated { .. } => "updated",
            Notification::Deleted(_) => "deleted",
        }
    }
}

/// Receives notifications from a watcher.
#[async_trait::async_trait]
pub trait NotificationHandler<K>: Send + Sync {
    async fn handle(&self, notification: Notification<K>);
}

/// `namespace/name`, the key objects are tracked under
pub fn object_key<K: Resource>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Last seen state of every watched object.
///
/// Knows the previous version of an object so applies can be reported as
/// updates, and notices objects that vanished while the watch was relisting.
#[derive(Debug)]
pub struct EventTracker<K> {
    known: BTreeMap<String, Arc<K>>,
    relisting: Option<HashSet<String>>,
    synced: bool,
}

impl<K> Default for EventTracker<K> {
    fn default() -> Self {
        Self {
            known: BTreeMap::new(),
            relisting: None,
            synced: false,
        }
    }
}

impl<K: Resource> EventTracker<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the first full listing has completed
    #[cfg(test)]
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.known.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Fold one watch event into the tracked state.
    pub fn apply(&mut self, event: watcher::Event<K>) -> Vec<Notification<K>> {
        match event {
            watcher::Event::Init => {
                debug!("relist started");
                self.relisting = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                let key = object_key(&obj);
                if let Some(seen) = self.relisting.as_mut() {
                    seen.insert(key.clone());
                }
                let obj = Arc::new(obj);
                self.known.insert(key, Arc::clone(&obj));
                vec![Notification::Added(obj)]
            }
            watcher::Event::InitDone => {
                self.synced = true;
                let Some(seen) = self.relisting.take() else {
                    return Vec::new();
                };

                let stale: Vec<String> = self
                    .known
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();

                stale
                    .into_iter()
                    .filter_map(|key| self.known.remove(&key))
                    .map(Notification::Deleted)
                    .collect()
            }
            watcher::Event::Apply(obj) => {
                let obj = Arc::new(obj);
                match self.known.insert(object_key(obj.as_ref()), Arc::clone(&obj)) {
                    Some(old) => vec![Notification::Updated { old, new: obj }],
                    None => vec![Notification::Added(obj)],
                }
            }
            watcher::Event::Delete(obj) => {
                self.known.remove(&object_key(&obj));
                vec![Notification::Deleted(Arc::new(obj))]
            }
        }
    }

    /// Replay every live object as an add; nothing before the first listing completed.
    pub fn resync(&self) -> Vec<Notification<K>> {
        if !self.synced {
            return Vec::new();
        }
        self.known
            .values()
            .map(|obj| Notification::Added(Arc::clone(obj)))
            .collect()
    }
}

/// Watches one namespaced resource kind with a label selector.
pub struct ResourceWatcher<K: Resource> {
    api: Api<K>,
    watcher_config: watcher::Config,
    resync_period: Duration,
}

impl<K> ResourceWatcher<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    /// Creates a watcher scoped to `config.namespace` (all namespaces when unset).
    pub fn new(client: Client, config: &WatchConfig) -> Self {
        let api: Api<K> = match config.namespace.as_deref() {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        };

        let mut watcher_config = watcher::Config::default();
        if !config.selector.is_empty() {
            watcher_config = watcher_config.labels(&config.selector);
        }

        Self {
            api,
            watcher_config,
            resync_period: config.resync_period,
        }
    }

    /// Delivers notifications to `handler` until `shutdown` is cancelled.
    pub async fn run<H>(self, handler: &H, shutdown: CancellationToken) -> Result<(), ControllerError>
    where
        H: NotificationHandler<K> + ?Sized,
    {
        let kind = K::kind(&());
        info!(
            "Starting {} watcher (selector: {:?}, resync every {:?})",
            kind,
            self.watcher_config.label_selector.as_deref().unwrap_or(""),
            self.resync_period
        );

        let stream = watcher(self.api, self.watcher_config).default_backoff();
        run_stream(stream, self.resync_period, handler, shutdown).await
    }
}

/// Drives a watch event stream through an `EventTracker` into `handler`.
///
/// Stream errors are logged and skipped; the stream reconnects on its own.
/// Returns an error only if the stream ends, which a live watch never does.
pub async fn run_stream<K, S, H>(
    stream: S,
    resync_period: Duration,
    handler: &H,
    shutdown: CancellationToken,
) -> Result<(), ControllerError>
where
    K: Resource,
    K::DynamicType: Default,
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>>,
    H: NotificationHandler<K> + ?Sized,
{
    let dt = K::DynamicType::default();
    let kind = K::kind(&dt);
    let mut stream = std::pin::pin!(stream);
    let mut tracker = EventTracker::new();

    let mut resync = tokio::time::interval_at(Instant::now() + resync_period, resync_period);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let batch = tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,
            _ = resync.tick() => {
                let batch = tracker.resync();
                debug!("Resyncing {} {} objects", batch.len(), kind);
                batch
            }
            item = stream.next() => match item {
                Some(Ok(event)) => {
                    let init_done = matches!(event, watcher::Event::InitDone);
                    let batch = tracker.apply(event);
                    if init_done {
                        info!("{} watcher synced ({} objects)", kind, tracker.len());
                    }
                    batch
                }
                Some(Err(e)) => {
                    warn!("{} watch stream error (will retry): {}", kind, e);
                    continue;
                }
                None => {
                    return Err(ControllerError::Watch(format!("{} watch stream ended", kind)));
                }
            },
        };

        for notification in batch {
            if shutdown.is_cancelled() {
                break;
            }
            debug!("{} {} {}", kind, object_key(notification.object()), notification.verb());
            handler.handle(notification).await;
        }
    }

    info!("{} watcher stopped", kind);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::configmap;
    use futures::stream;
    use k8s_openapi::api::core::v1::ConfigMap;
    use std::sync::Mutex;

    fn names(batch: &[Notification<ConfigMap>]) -> Vec<String> {
        batch
            .iter()
            .map(|n| format!("{} {}", n.verb(), object_key(n.object())))
            .collect()
    }

    #[test]
    fn test_initial_listing_is_added() {
        let mut tracker = EventTracker::new();
        assert!(tracker.apply(watcher::Event::Init).is_empty());
        let added = tracker.apply(watcher::Event::InitApply(configmap("a", "ns", &[])));
        assert_eq!(names(&added), vec!["added ns/a"]);
        assert!(!tracker.is_synced());
        assert!(tracker.apply(watcher::Event::InitDone).is_empty());
        assert!(tracker.is_synced());
    }

    #[test]
    fn test_apply_of_known_object_is_update() {
        let mut tracker = EventTracker::new();
        tracker.apply(watcher::Event::Init);
        tracker.apply(watcher::Event::InitApply(configmap("a", "ns", &[("x.json", "{}")])));
        tracker.apply(watcher::Event::InitDone);

        let batch = tracker.apply(watcher::Event::Apply(configmap("a", "ns", &[("y.json", "{}")])));
        match batch.as_slice() {
            [Notification::Updated { old, new }] => {
                assert!(old.data.as_ref().unwrap().contains_key("x.json"));
                assert!(new.data.as_ref().unwrap().contains_key("y.json"));
            }
            other => panic!("expected one update, got {:?}", names(other)),
        }

        let batch = tracker.apply(watcher::Event::Apply(configmap("b", "ns", &[])));
        assert_eq!(names(&batch), vec!["added ns/b"]);
    }

    #[test]
    fn test_delete_forgets_object() {
        let mut tracker = EventTracker::new();
        tracker.apply(watcher::Event::Apply(configmap("a", "ns", &[])));
        let batch = tracker.apply(watcher::Event::Delete(configmap("a", "ns", &[])));
        assert_eq!(names(&batch), vec!["deleted ns/a"]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_relist_reports_vanished_objects() {
        let mut tracker = EventTracker::new();
        tracker.apply(watcher::Event::Init);
        tracker.apply(watcher::Event::InitApply(configmap("a", "ns", &[])));
        tracker.apply(watcher::Event::InitApply(configmap("b", "ns", &[])));
        tracker.apply(watcher::Event::InitDone);

        // watch reconnects and the relist no longer contains "a"
        tracker.apply(watcher::Event::Init);
        let batch = tracker.apply(watcher::Event::InitApply(configmap("b", "ns", &[])));
        assert_eq!(names(&batch), vec!["added ns/b"]);
        let batch = tracker.apply(watcher::Event::InitDone);
        assert_eq!(names(&batch), vec!["deleted ns/a"]);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_resync_replays_everything_as_added() {
        let mut tracker = EventTracker::new();
        tracker.apply(watcher::Event::Init);
        tracker.apply(watcher::Event::InitApply(configmap("b", "ns", &[])));
        assert!(tracker.resync().is_empty(), "no resync before the listing completes");
        tracker.apply(watcher::Event::InitApply(configmap("a", "other", &[])));
        tracker.apply(watcher::Event::InitDone);

        assert_eq!(names(&tracker.resync()), vec!["added ns/b", "added other/a"]);
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl NotificationHandler<ConfigMap> for Recorder {
        async fn handle(&self, notification: Notification<ConfigMap>) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{} {}", notification.verb(), object_key(notification.object())));
        }
    }

    fn listing(objects: Vec<ConfigMap>) -> Vec<Result<watcher::Event<ConfigMap>, watcher::Error>> {
        let mut events = vec![Ok(watcher::Event::Init)];
        events.extend(objects.into_iter().map(|o| Ok(watcher::Event::InitApply(o))));
        events.push(Ok(watcher::Event::InitDone));
        events
    }

    #[tokio::test]
    async fn test_run_stream_delivers_in_order_and_stops_on_cancel() {
        let mut events = listing(vec![configmap("a", "ns", &[])]);
        events.push(Ok(watcher::Event::Apply(configmap("a", "ns", &[]))));
        events.push(Ok(watcher::Event::Delete(configmap("a", "ns", &[]))));
        let stream = stream::iter(events).chain(stream::pending());

        let recorder = Recorder::default();
        let shutdown = CancellationToken::new();
        let canceller = shutdown.clone();

        let run = run_stream(stream, Duration::from_secs(3600), &recorder, shutdown);
        let stop = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        };
        let (result, ()) = tokio::join!(run, stop);

        assert!(result.is_ok());
        assert_eq!(recorder.seen(), vec!["added ns/a", "updated ns/a", "deleted ns/a"]);
    }

    #[tokio::test]
    async fn test_run_stream_resyncs_periodically() {
        let stream = stream::iter(listing(vec![configmap("a", "ns", &[])])).chain(stream::pending());

        let recorder = Recorder::default();
        let shutdown = CancellationToken::new();
        let canceller = shutdown.clone();

        let run = run_stream(stream, Duration::from_millis(20), &recorder, shutdown);
        let stop = async {
            tokio::time::sleep(Duration::from_millis(110)).await;
            canceller.cancel();
        };
        let (result, ()) = tokio::join!(run, stop);

        assert!(result.is_ok());
        let seen = recorder.seen();
        assert!(seen.len() >= 3, "expected initial add plus resyncs, got {:?}", seen);
        assert!(seen.iter().all(|s| s == "added ns/a"));
    }

    #[tokio::test]
    async fn test_run_stream_end_is_an_error() {
        let stream = stream::iter(listing(vec![]));
        let recorder = Recorder::default();

        let result = run_stream(stream, Duration::from_secs(3600), &recorder, CancellationToken::new()).await;
        assert!(matches!(result, Err(ControllerError::Watch(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_delivers_nothing() {
        let stream = stream::iter(listing(vec![configmap("a", "ns", &[])]));
        let recorder = Recorder::default();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        run_stream(stream, Duration::from_secs(3600), &recorder, shutdown).await.unwrap();
        assert!(recorder.seen().is_empty());
    }
}
