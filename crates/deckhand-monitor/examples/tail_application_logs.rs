use std::sync::Arc;
use std::time::Duration;

use deckhand_monitor::RemoteBackend;
use deckhand_monitor::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), MonitorError> {
    deckhand_monitor::init_observability();

    let app_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "app-demo".to_string());

    let monitor = Monitor::builder()
        .backend(Arc::new(RemoteBackend::from_env()?))
        .max_lines(2_000)
        .build()?;
    let mut session = monitor.session(Subject::application_logs(app_id));
    session.start();

    let mut state = session.state();
    let follow = async {
        // Diffing on `lines_seen` stays correct after the rolling cap
        // starts evicting; an index into `lines` would not.
        let mut seen = 0u64;
        while state.changed().await.is_ok() {
            let snapshot = state.borrow_and_update().clone();
            let fresh = snapshot
                .lines_seen
                .saturating_sub(seen)
                .min(snapshot.lines.len() as u64) as usize;
            seen = snapshot.lines_seen;
            for line in &snapshot.lines[snapshot.lines.len() - fresh..] {
                println!("{line}");
            }
        }
    };

    tokio::select! {
        _ = follow => {}
        _ = tokio::time::sleep(Duration::from_secs(60)) => {}
    }

    session.stop();
    while let Some(event) = session.try_next_event() {
        eprintln!("session event: {event:?}");
    }
    Ok(())
}
