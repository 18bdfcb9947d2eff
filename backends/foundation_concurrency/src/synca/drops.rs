/// `RunOnDrop` runs a function when it gets dropped, providing a
/// similar convention to go's defer.
///
/// Unlike a plain defer it can be disarmed, which makes it usable as a
/// failure hook: arm it before work that may panic or never run, then
/// disarm once the work reached a point where the hook no longer applies.
pub struct RunOnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> RunOnDrop<F> {
    pub fn new(f: F) -> Self {
        Self(Some(f))
    }

    /// Consumes the guard without running its function.
    pub fn disarm(mut self) {
        self.0.take();
    }
}

impl<F: FnOnce()> Drop for RunOnDrop<F> {
    fn drop(&mut self) {
        if let Some(cb) = self.0.take() {
            cb();
        }
    }
}
