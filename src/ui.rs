//! The UI-marshaling callback: the other half of the "collaborator
//! callback" pair alongside `ConsentOracle`. The core never draws a
//! window; it only hands a closure to whatever owns the event loop.
use std::sync::Arc;

/// Marshals a closure onto the UI thread. The GUI collaborator owns the
/// receiving end (an event-loop wake-up, a signal mutation); this crate
/// only calls it, typically right before blocking on `ConsentOracle::ask`
/// so the dialog the closure schedules has something to show.
pub type UiPoster = Arc<dyn Fn(Box<dyn FnOnce() + Send>) + Send + Sync>;

/// Runs the closure synchronously in place. Useful for headless
/// operation (no real UI thread to marshal onto), the same role
/// `AutoAcceptOracle` plays on the consent side.
pub fn inline_ui_poster() -> UiPoster {
    Arc::new(|f| f())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn inline_poster_runs_the_closure_immediately() {
        let ran = Arc::new(AtomicBool::new(false));
        let poster = inline_ui_poster();
        let flag = ran.clone();
        poster(Box::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(ran.load(Ordering::SeqCst));
    }
}
