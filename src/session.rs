//! Session state: the selected image and the result slot.
//!
//! A page view owns exactly two slots, written only through this type:
//!
//! * the **image slot**: replaced on every selection;
//! * the **result slot**: `Empty`, `Solved` or `Failed`, overwritten
//!   wholesale when a completion is accepted.
//!
//! The slots are deliberately not synchronised. Selecting a new image leaves
//! the previous result in place until the new request resolves; the view
//! reports that situation through [`SessionView::stale`] so the page can
//! label it instead of hiding it.
//!
//! Every selection is issued a [`Ticket`] with a monotonically increasing
//! sequence number. Which completions may overwrite the result slot is
//! decided by the [`OverwritePolicy`].

use crate::config::OverwritePolicy;
use crate::error::SolveError;
use crate::pipeline::ingest::SelectedImage;
use crate::pipeline::llm::Solution;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Sequence number tying a request back to the selection that started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Ticket(pub u64);

/// Contents of the result slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResultSlot {
    /// No request has completed yet.
    Empty,
    /// The latest accepted completion succeeded.
    Solved { ticket: Ticket, solution: Solution },
    /// The latest accepted completion failed.
    Failed { ticket: Ticket, error: SolveError },
}

impl ResultSlot {
    pub fn ticket(&self) -> Option<Ticket> {
        match self {
            ResultSlot::Empty => None,
            ResultSlot::Solved { ticket, .. } | ResultSlot::Failed { ticket, .. } => Some(*ticket),
        }
    }
}

/// The mutable state behind one page.
#[derive(Debug)]
pub struct Session {
    policy: OverwritePolicy,
    next_seq: u64,
    image: Option<(Ticket, SelectedImage)>,
    result: ResultSlot,
    in_flight: usize,
}

impl Session {
    pub fn new(policy: OverwritePolicy) -> Self {
        Self {
            policy,
            next_seq: 1,
            image: None,
            result: ResultSlot::Empty,
            in_flight: 0,
        }
    }

    pub fn policy(&self) -> OverwritePolicy {
        self.policy
    }

    /// Replace the image slot and issue a ticket for its request.
    ///
    /// The result slot is left untouched.
    pub fn select(&mut self, image: SelectedImage) -> Ticket {
        let ticket = Ticket(self.next_seq);
        self.next_seq += 1;
        self.in_flight += 1;
        debug!("Ticket {} issued for '{}'", ticket.0, image.name);
        self.image = Some((ticket, image));
        ticket
    }

    /// Record a selection whose file could not be read.
    ///
    /// The selection still supersedes earlier ones, but it has no
    /// displayable form, so the image slot is cleared.
    pub fn fail_selection(&mut self, error: SolveError) -> Ticket {
        let ticket = Ticket(self.next_seq);
        self.next_seq += 1;
        warn!("Ticket {} failed before any request: {}", ticket.0, error);
        self.image = None;
        self.result = ResultSlot::Failed { ticket, error };
        ticket
    }

    /// Record a finished request.
    ///
    /// Returns `true` if the outcome was written to the result slot.
    pub fn complete(&mut self, ticket: Ticket, outcome: Result<Solution, SolveError>) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);

        let accept = match self.policy {
            OverwritePolicy::CompletionOrder => true,
            OverwritePolicy::LatestSelection => ticket == self.latest_ticket(),
        };
        if !accept {
            warn!(
                "Discarding completion for ticket {} (latest is {})",
                ticket.0,
                self.latest_ticket().0
            );
            return false;
        }

        self.result = match outcome {
            Ok(solution) => {
                info!("Ticket {} solved ({} chars)", ticket.0, solution.text.len());
                ResultSlot::Solved { ticket, solution }
            }
            Err(error) => {
                warn!("Ticket {} failed: {}", ticket.0, error);
                ResultSlot::Failed { ticket, error }
            }
        };
        true
    }

    /// Most recently issued ticket (`Ticket(0)` before any selection).
    pub fn latest_ticket(&self) -> Ticket {
        Ticket(self.next_seq - 1)
    }

    pub fn image(&self) -> Option<&SelectedImage> {
        self.image.as_ref().map(|(_, img)| img)
    }

    /// The selected image, if it is still the one issued `ticket`.
    pub fn image_for(&self, ticket: Ticket) -> Option<&SelectedImage> {
        self.image
            .as_ref()
            .filter(|(t, _)| *t == ticket)
            .map(|(_, img)| img)
    }

    pub fn result(&self) -> &ResultSlot {
        &self.result
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Immutable snapshot for rendering.
    pub fn view(&self) -> SessionView {
        let image_ticket = self.image.as_ref().map(|(t, _)| *t);
        let stale = match (image_ticket, self.result.ticket()) {
            (Some(img), Some(res)) => res != img,
            _ => false,
        };
        SessionView {
            image: self.image.as_ref().map(|(ticket, img)| ImageView {
                ticket: *ticket,
                name: img.name.clone(),
                mime_type: img.mime_type.clone(),
                size: img.len(),
                preview_url: format!("/preview/{}", ticket.0),
            }),
            result: self.result.clone(),
            pending: self.in_flight > 0,
            in_flight: self.in_flight,
            stale,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(OverwritePolicy::default())
    }
}

/// What the presentation layer needs about the selected image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageView {
    pub ticket: Ticket,
    pub name: String,
    pub mime_type: String,
    pub size: usize,
    /// Where the page loads the preview from; changes with every selection.
    pub preview_url: String,
}

/// Snapshot of a [`Session`]; rendering is a pure function of this.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub image: Option<ImageView>,
    pub result: ResultSlot,
    /// At least one request is still in flight.
    pub pending: bool,
    pub in_flight: usize,
    /// The result belongs to an earlier selection than the image shown.
    pub stale: bool,
}

impl SessionView {
    /// The view of a session nobody has touched yet.
    pub fn empty() -> Self {
        Session::default().view()
    }
}
