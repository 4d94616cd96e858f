use std::fmt;

/// The operational status of a component guarded by a [`StateMachine`](crate::StateMachine).
///
/// States only ever move forward: `New` -> `Started` -> `Shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The component has been created but not started.
    New,
    /// The component is actively running.
    Started,
    /// The component has been stopped. Terminal.
    Shutdown,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::New => "New",
            State::Started => "Started",
            State::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}
