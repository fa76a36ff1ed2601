/// The coordinator's lifecycle. `Crashed` is distinct from `Stopped`: it
/// marks a worker pool that exited on its own (panic or fatal dispatch error) rather
/// than via an explicit `stop()` call, which is what makes `auto_restart` eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Stopped,
    Running,
    Crashed,
}
