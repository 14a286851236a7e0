/// Offer/answer bookkeeping for a subscribe connection.
///
/// At most one server offer is outstanding at a time; any number of
/// renegotiation requests made meanwhile collapse into a single follow-up offer.
#[derive(Debug, Default)]
pub(crate) struct Negotiation {
    ready: bool,
    offer_outstanding: bool,
    pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// The client has not signalled `sub_ready` yet.
    NotReady,
    Stable,
    /// An offer was sent and its answer has not arrived.
    Negotiating,
}

impl Negotiation {
    pub(crate) fn state(&self) -> NegotiationState {
        if !self.ready {
            NegotiationState::NotReady
        } else if self.offer_outstanding {
            NegotiationState::Negotiating
        } else {
            NegotiationState::Stable
        }
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.pending
    }

    /// Returns true if an offer should be sent now, otherwise remembers the request.
    pub(crate) fn request(&mut self) -> bool {
        if self.state() == NegotiationState::Stable {
            true
        } else {
            self.pending = true;
            false
        }
    }

    /// Returns true if a request arrived before the client was ready.
    pub(crate) fn mark_ready(&mut self) -> bool {
        self.ready = true;
        self.take_pending()
    }

    pub(crate) fn offer_sent(&mut self) {
        self.offer_outstanding = true;
        self.pending = false;
    }

    /// Returns true if requests arrived while the offer was outstanding.
    pub(crate) fn answer_applied(&mut self) -> bool {
        self.offer_outstanding = false;
        self.take_pending()
    }

    fn take_pending(&mut self) -> bool {
        if self.state() == NegotiationState::Stable && self.pending {
            self.pending = false;
            true
        } else {
            false
        }
    }
}
