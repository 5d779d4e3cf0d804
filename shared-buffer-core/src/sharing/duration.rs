use std::time::Duration;

/// Longest of `durations`, or `None` when there are none.
///
/// An empty set imposes no minimum, so callers leave the resource at
/// whatever it last retained.
pub(crate) fn max_required<'a, I>(durations: I) -> Option<Duration>
where
    I: IntoIterator<Item = &'a Duration>,
{
    durations.into_iter().copied().max()
}
