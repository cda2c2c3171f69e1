use tokio::sync::oneshot;

use parley_core::ApprovalResolution;

/// One-shot rendezvous between a suspended negotiation turn and the human
/// decision that releases it.
///
/// The gate has no timeout; the only ways out are [`resolve`] (a human
/// approved or rejected) and [`cancel`] (session stop force-resolves as
/// rejected). Whichever comes first wins; later calls are no-ops, so the
/// rendezvous is resolved exactly once.
///
/// [`resolve`]: ApprovalGate::resolve
/// [`cancel`]: ApprovalGate::cancel
#[derive(Debug)]
pub struct ApprovalGate {
    tx: Option<oneshot::Sender<ApprovalResolution>>,
    rx: oneshot::Receiver<ApprovalResolution>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self { tx: Some(tx), rx }
    }

    pub fn is_resolved(&self) -> bool {
        self.tx.is_none()
    }

    /// Resolves the gate. Returns false if it was already resolved.
    pub fn resolve(&mut self, resolution: ApprovalResolution) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(resolution).is_ok(),
            None => false,
        }
    }

    /// Force-resolves as rejected with no directive. Idempotent.
    pub fn cancel(&mut self) -> bool {
        self.resolve(ApprovalResolution::Rejected { directive: None })
    }

    /// Waits for the resolution. If the sender half was somehow dropped
    /// unresolved, this degrades to a rejection rather than an error; a
    /// suspended turn must always be released with something actionable.
    pub async fn wait(self) -> ApprovalResolution {
        self.rx.await.unwrap_or(ApprovalResolution::Rejected { directive: None })
    }
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use parley_core::ApprovalResolution;

    use super::ApprovalGate;

    #[tokio::test]
    async fn resolution_reaches_the_waiter() {
        let mut gate = ApprovalGate::new();
        assert!(gate.resolve(ApprovalResolution::Approved));
        assert_eq!(gate.wait().await, ApprovalResolution::Approved);
    }

    #[tokio::test]
    async fn second_resolution_is_rejected() {
        let mut gate = ApprovalGate::new();
        assert!(gate.resolve(ApprovalResolution::Approved));
        assert!(!gate.resolve(ApprovalResolution::Rejected { directive: None }));
        assert!(gate.is_resolved());
        assert_eq!(gate.wait().await, ApprovalResolution::Approved);
    }

    #[tokio::test]
    async fn cancel_force_resolves_as_rejected() {
        let mut gate = ApprovalGate::new();
        assert!(gate.cancel());
        assert!(!gate.cancel());
        assert_eq!(gate.wait().await, ApprovalResolution::Rejected { directive: None });
    }

    #[tokio::test]
    async fn rejection_carries_the_directive() {
        let mut gate = ApprovalGate::new();
        gate.resolve(ApprovalResolution::Rejected {
            directive: Some("counter with $49/mo".to_owned()),
        });

        let resolution = gate.wait().await;
        assert_eq!(
            resolution,
            ApprovalResolution::Rejected { directive: Some("counter with $49/mo".to_owned()) }
        );
    }
}
