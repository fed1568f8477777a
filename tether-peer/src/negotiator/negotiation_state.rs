use std::fmt;

/// Offer/answer progress of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    Idle,
    /// Initiator is creating and applying its offer.
    OfferPending,
    /// Offer is out; waiting for the answer.
    OfferSent,
    /// Responder has the remote offer and is composing its answer.
    AwaitingAnswer,
    /// Both descriptions are applied; connectivity not yet confirmed.
    AnswerApplied,
    Connected,
    Closed,
    Failed,
}

impl NegotiationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, NegotiationState::Closed | NegotiationState::Failed)
    }

    pub fn can_transition_to(self, next: NegotiationState) -> bool {
        use NegotiationState::*;

        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Idle, OfferPending)
                | (Idle, AwaitingAnswer)
                | (OfferPending, OfferSent)
                | (OfferSent, AnswerApplied)
                | (AwaitingAnswer, AnswerApplied)
                | (AnswerApplied, Connected)
                | (_, Closed)
                | (_, Failed)
        )
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
