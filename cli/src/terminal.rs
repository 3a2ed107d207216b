//! Sign-in through a browser the user drives by hand.
//!
//! The sign-in URL is printed; the user opens it, signs in, and pastes the
//! URL the browser ends up on. Every pasted line is treated as one
//! navigation.

use std::future::Future;
use std::io::BufRead;

use tokio::sync::mpsc;
use url::Url;
use wopi_auth::providers::SignInSurface;
use wopi_auth::{AuthResult, FlowError, NavigationDecision, RedirectWatcher, Result};

/// Reads navigations from standard input.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalSignIn;

impl SignInSurface for TerminalSignIn {
    fn sign_in(
        &self,
        url: Url,
        mut watcher: RedirectWatcher,
    ) -> impl Future<Output = Result<AuthResult>> + Send {
        async move {
            println!();
            println!("Open this URL in a browser and sign in:");
            println!();
            println!("    {url}");
            println!();
            println!("Then paste the URL the browser was redirected to and press Enter.");
            println!("End input (Ctrl-D) to give up, or press Ctrl-C to cancel.");

            let mut navigations = stdin_lines();
            while let Some(line) = navigations.recv().await {
                let navigation = line.trim();
                if navigation.is_empty() {
                    continue;
                }
                match watcher.observe(navigation) {
                    NavigationDecision::Capture(outcome) => return outcome,
                    NavigationDecision::Allow => {
                        println!("Not the redirect URL yet; paste the next one.");
                    }
                    NavigationDecision::Ignore => {}
                }
            }
            Err(FlowError::SignInAbandoned)
        }
    }
}

/// Lines of standard input, read on a dedicated thread.
///
/// Blocking reads on stdin cannot be interrupted, so the reader is not tied
/// to the runtime; it ends with the process or when the receiver is dropped
/// and another line arrives.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
