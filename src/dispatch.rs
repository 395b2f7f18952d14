use std::collections::{HashMap, HashSet};
use std::process::Command;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::types::{DispatchStatus, SenderGroup, StatusUpdate, UnsubscribeLinks};

/// Fire-and-forget capability for triggering a sender's advertised
/// unsubscribe mechanism. `Ok` means the invocation itself was handed off;
/// whether the remote side honors it is unknowable from this layer, so a
/// later `Done` status is necessarily optimistic.
pub trait ActionInvoker {
    fn open_url(&self, url: &str) -> AppResult<()>;
    fn compose_mail(&self, mailto: &str) -> AppResult<()>;
}

/// Hands both URLs and mailto URIs to the platform opener, the same
/// mechanism the OAuth consent flow uses for the browser.
pub struct SystemInvoker;

impl ActionInvoker for SystemInvoker {
    fn open_url(&self, url: &str) -> AppResult<()> {
        open_external(url)
    }

    fn compose_mail(&self, mailto: &str) -> AppResult<()> {
        open_external(mailto)
    }
}

pub(crate) fn open_external(target: &str) -> AppResult<()> {
    let attempt = if cfg!(target_os = "macos") {
        Command::new("open").arg(target).status()
    } else if cfg!(target_os = "windows") {
        Command::new("rundll32.exe")
            .args(["url.dll,FileProtocolHandler", target])
            .status()
    } else {
        Command::new("xdg-open").arg(target).status()
    };

    match attempt {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(AppError::Action(format!("opener exited with {status}"))),
        Err(e) => Err(AppError::Action(format!("could not launch opener: {e}"))),
    }
}

/// Delays that throttle the dispatch loop. `settle` holds a visible
/// `Processing` interval before an item is marked `Done`; `step` paces
/// consecutive senders; `cleanup` is how long finished groups stay visible
/// after the run before being removed.
#[derive(Clone, Copy, Debug)]
pub struct Pacing {
    pub settle: Duration,
    pub step: Duration,
    pub cleanup: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(500),
            step: Duration::from_millis(300),
            cleanup: Duration::from_millis(2000),
        }
    }
}

/// What the engine acts on: a sender key plus its unsubscribe metadata,
/// detached from the group list so the caller keeps ownership of the groups
/// during the run.
#[derive(Clone, Debug)]
pub struct DispatchItem {
    pub email: String,
    pub links: UnsubscribeLinks,
}

impl DispatchItem {
    pub fn from_group(group: &SenderGroup) -> Self {
        Self {
            email: group.email.clone(),
            links: group.links.clone(),
        }
    }
}

/// Terminal statuses of one run, snapshotted before the deferred cleanup
/// clears the engine's map.
#[derive(Clone, Debug)]
pub struct DispatchReport {
    pub statuses: HashMap<String, DispatchStatus>,
    pub cleaned: usize,
}

/// Executes unsubscribe actions for selected senders, strictly one at a
/// time in the order given. One sender's failure never aborts the run, and
/// nothing is retried automatically.
pub struct DispatchEngine<'a, A: ActionInvoker> {
    invoker: &'a A,
    pacing: Pacing,
    statuses: HashMap<String, DispatchStatus>,
    updates: UnboundedSender<StatusUpdate>,
}

impl<'a, A: ActionInvoker> DispatchEngine<'a, A> {
    pub fn new(invoker: &'a A, pacing: Pacing, updates: UnboundedSender<StatusUpdate>) -> Self {
        Self {
            invoker,
            pacing,
            statuses: HashMap::new(),
            updates,
        }
    }

    /// Run one dispatch pass. Senders whose action is invoked without error
    /// leave `selection` immediately; after the cleanup window their groups
    /// leave `groups` as well. Failed senders stay in both, visible for a
    /// later manual retry.
    pub async fn run(
        &mut self,
        items: &[DispatchItem],
        groups: &mut Vec<SenderGroup>,
        selection: &mut HashSet<String>,
    ) -> DispatchReport {
        self.statuses.clear();
        for item in items {
            self.set_status(&item.email, DispatchStatus::Pending);
        }

        let mut cleaned = 0usize;
        for item in items {
            self.set_status(&item.email, DispatchStatus::Processing);

            match self.invoke(&item.links) {
                Ok(mechanism) => {
                    // Hold a visible processing interval before settling.
                    sleep(self.pacing.settle).await;
                    self.set_status(&item.email, DispatchStatus::Done);
                    cleaned += 1;
                    selection.remove(&item.email);
                    info!(sender = %item.email, mechanism, "Unsubscribe dispatched");
                }
                Err(e) => {
                    warn!(sender = %item.email, error = %e, "Unsubscribe action failed");
                    self.set_status(&item.email, DispatchStatus::Error);
                }
            }

            sleep(self.pacing.step).await;
        }

        let report = DispatchReport {
            statuses: self.statuses.clone(),
            cleaned,
        };

        // Keep completed items visible for a moment, then drop their groups
        // from the result set and reset the status map for the next run.
        sleep(self.pacing.cleanup).await;
        groups.retain(|g| self.statuses.get(&g.email) != Some(&DispatchStatus::Done));
        self.statuses.clear();

        report
    }

    /// Prefer the HTTP link, fall back to mailto. A sender with neither is
    /// a no-op that still settles as `Done`; offering such a sender is the
    /// selection layer's mistake, not a reason to fail here.
    fn invoke(&self, links: &UnsubscribeLinks) -> AppResult<&'static str> {
        if let Some(url) = &links.http_url {
            self.invoker.open_url(url).map(|_| "http")
        } else if let Some(mailto) = &links.mailto {
            self.invoker.compose_mail(mailto).map(|_| "mailto")
        } else {
            Ok("none")
        }
    }

    fn set_status(&mut self, email: &str, status: DispatchStatus) {
        self.statuses.insert(email.to_string(), status);
        let _ = self.updates.send(StatusUpdate {
            email: email.to_string(),
            status,
        });
    }
}
