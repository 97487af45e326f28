//! Build Secret watch.

use brigade_core::{BuildRecord, WatchEvent};
use futures::{Stream, StreamExt, future};
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client};
use tracing::warn;

use crate::kubernetes::build_record_from_secret;

/// Field selector matching build record Secrets.
pub const BUILD_SECRET_SELECTOR: &str = "type=brigade.sh/build";

/// Watch build records in `namespace`.
///
/// Watch errors are logged and retried with backoff; the stream only ends
/// when dropped.
pub fn watch_builds(
    client: Client,
    namespace: &str,
) -> impl Stream<Item = WatchEvent<BuildRecord>> + Send + 'static {
    let api: Api<Secret> = Api::namespaced(client, namespace);
    let config = watcher::Config::default().fields(BUILD_SECRET_SELECTOR);

    watcher(api, config)
        .default_backoff()
        .filter_map(|event| {
            future::ready(match event {
                Ok(event) => Some(watch_event(event)),
                Err(e) => {
                    warn!(error = %e, "Build watch error");
                    None
                }
            })
        })
}

/// Translate a watcher event into a controller watch event.
pub fn watch_event(event: watcher::Event<Secret>) -> WatchEvent<BuildRecord> {
    match event {
        watcher::Event::Apply(secret) => WatchEvent::Applied(build_record_from_secret(&secret)),
        watcher::Event::Delete(secret) => WatchEvent::Deleted(build_record_from_secret(&secret)),
        watcher::Event::Init => WatchEvent::RelistStarted,
        watcher::Event::InitApply(secret) => {
            WatchEvent::Relisted(build_record_from_secret(&secret))
        }
        watcher::Event::InitDone => WatchEvent::RelistDone,
    }
}
