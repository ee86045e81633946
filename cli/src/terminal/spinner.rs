//! Progress readout fed by the run's watch channel.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use sondr_common::report::RunProgress;

/// Mirrors scheduler progress into the span's progress bar. Ends on its
/// own when the run drops the channel.
pub fn track_progress(span: Span, mut progress: watch::Receiver<RunProgress>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snapshot = *progress.borrow();
            span.pb_set_message(&format!(
                "{}/{} units settled, {}/{} targets done",
                snapshot.settled, snapshot.total, snapshot.targets_done, snapshot.targets_total
            ));
        }
    })
}
