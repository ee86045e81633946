//! Interactive cancel key.

use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode};

use sondr_common::info;
use sondr_core::CancelToken;

/// Watches the keyboard on a plain thread; 'q' cancels the run. The
/// poll loop stops once the token fires, however it fired.
pub fn listen_for_cancel(token: CancelToken) {
    thread::spawn(move || {
        while !token.is_cancelled() {
            if event::poll(Duration::from_millis(200)).unwrap_or(false)
                && let Ok(Event::Key(key)) = event::read()
                && key.code == KeyCode::Char('q')
            {
                info!("cancellation requested, letting in-flight work settle");
                token.cancel();
                break;
            }
        }
    });
}
