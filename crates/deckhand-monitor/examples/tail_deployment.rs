use deckhand_monitor::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), MonitorError> {
    deckhand_monitor::init_observability();

    let deployment_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "dep-demo".to_string());

    let monitor = Monitor::from_env()?;
    let mut session = monitor.session(Subject::deployment(deployment_id));
    session.start();

    let mut state = session.state();
    let mut renderer = RenderAdapter::new();
    let mut printed = 0;

    while state.changed().await.is_ok() {
        let view = renderer.render(&state.borrow_and_update(), ViewportMetrics::default());
        for segments in view.lines.iter().skip(printed) {
            let text: String = segments.iter().map(|s| s.text.as_str()).collect();
            println!("{text}");
        }
        printed = view.line_count;

        if let Some(status) = &view.status {
            eprintln!(
                "[{}] {:?} {}%",
                view.badge.label(),
                status.status,
                status.progress
            );
            if status.status.is_terminal() {
                break;
            }
        }
        if view.badge == ConnectionBadge::Disconnected && view.error.is_some() {
            break;
        }
    }

    session.stop();
    while let Some(event) = session.try_next_event() {
        match event {
            SessionEvent::Completed { status } => match status.duration_seconds {
                Some(secs) => eprintln!("deployment succeeded in {secs}s"),
                None => eprintln!("deployment succeeded"),
            },
            SessionEvent::Failed { message } => eprintln!("deployment failed: {message}"),
            SessionEvent::Ended { message } => {
                eprintln!("stream ended: {}", message.unwrap_or_default())
            }
            SessionEvent::Exhausted { attempts } => {
                eprintln!("gave up after {attempts} reconnect attempts")
            }
            SessionEvent::Error { error } => eprintln!("monitor error: {error}"),
        }
    }
    Ok(())
}
