/// Receives batch progress from [`ZipArchive::add_all_with_progress`](super::ZipArchive::add_all_with_progress).
///
/// Called on the writing thread after each entry is stored. Implementations
/// that render or forward the notification elsewhere should do so without
/// blocking; the archive does not depend on the sink for correctness.
pub trait ProgressSink {
    /// `current` of `max` entries are written; `name` is the last one.
    fn update(&mut self, current: usize, max: usize, name: &str);
}

/// A sink that ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&mut self, _current: usize, _max: usize, _name: &str) {}
}

impl<F: FnMut(usize, usize, &str)> ProgressSink for F {
    fn update(&mut self, current: usize, max: usize, name: &str) {
        self(current, max, name)
    }
}
