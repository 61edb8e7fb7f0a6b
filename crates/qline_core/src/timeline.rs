//! Observable timeline.
//!
//! A [`Timeline`] owns the observer lists of one object. Registration goes
//! through shared references so behaviors can reconfigure an object that is
//! already handed out; emission always works on a [`Timeline::snapshot`] so an
//! invocation sees one consistent pipeline even if observers change mid-flight.

use std::sync::{Arc, PoisonError, RwLock};

use crate::moment::{Moment, MomentRegistry};
use crate::observers::Observers;
use crate::SdkResult;

pub struct Timeline {
    observers: RwLock<Observers>,
}

impl Timeline {
    /// Creates a timeline with empty observer lists.
    pub fn new(registry: Arc<MomentRegistry>) -> Self {
        Self::from_observers(Observers::new(registry))
    }

    /// Creates a timeline starting from a copy of existing lists.
    pub fn from_observers(observers: Observers) -> Self {
        Self {
            observers: RwLock::new(observers),
        }
    }

    fn write<R>(&self, f: impl FnOnce(&mut Observers) -> R) -> R {
        let mut guard = self
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Copy of the current observer lists.
    pub fn snapshot(&self) -> Observers {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn on<H>(&self, moment: &Moment<H>, observer: H) -> SdkResult<&Self>
    where
        H: Send + Sync + 'static,
    {
        self.write(|obs| obs.on(moment, observer))?;
        Ok(self)
    }

    pub fn prepend<H>(&self, moment: &Moment<H>, observer: H) -> SdkResult<&Self>
    where
        H: Send + Sync + 'static,
    {
        self.write(|obs| obs.prepend(moment, observer))?;
        Ok(self)
    }

    /// Clears the moment and registers `observer` under one lock, so no
    /// snapshot can observe the cleared intermediate state.
    pub fn replace<H>(&self, moment: &Moment<H>, observer: H) -> SdkResult<&Self>
    where
        H: Send + Sync + 'static,
    {
        self.write(|obs| obs.replace(moment, observer))?;
        Ok(self)
    }

    pub fn clear<H>(&self, moment: &Moment<H>) -> SdkResult<&Self> {
        self.write(|obs| obs.clear(moment))?;
        Ok(self)
    }

    /// Resets the named moments to the lists held by `baseline`.
    pub fn restore_from(&self, baseline: &Observers, names: &[&'static str]) {
        self.write(|obs| obs.restore_from(baseline, names));
    }

    /// True when no moment has any observer.
    pub fn is_empty(&self) -> bool {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Timeline").field(&self.snapshot()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moment::{define_moments, MomentKind};
    use crate::observers::{listener, reducer, Reducer};
    use crate::{ErrorCode, SdkError, ERROR};
    use std::sync::Mutex;

    const PRE: Moment<Reducer<u32>> = Moment::new("pre", MomentKind::AsyncReduce);

    fn timeline() -> Timeline {
        Timeline::new(Arc::new(define_moments([("pre", MomentKind::AsyncReduce)])))
    }

    #[tokio::test]
    async fn test_snapshot_is_not_affected_by_later_registration() {
        let timeline = timeline();
        timeline
            .on(&PRE, reducer(|n: u32| async move { Ok(n + 1) }))
            .unwrap();

        let snapshot = timeline.snapshot();
        timeline
            .on(&PRE, reducer(|n: u32| async move { Ok(n * 10) }))
            .unwrap();

        assert_eq!(snapshot.emit_reduce(&PRE, 1).await.unwrap(), 2);
        assert_eq!(timeline.snapshot().emit_reduce(&PRE, 1).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_chained_registration() {
        let timeline = timeline();
        timeline
            .on(&PRE, reducer(|n: u32| async move { Ok(n + 1) }))
            .and_then(|t| t.prepend(&PRE, reducer(|n: u32| async move { Ok(n * 3) })))
            .unwrap();

        assert_eq!(timeline.snapshot().emit_reduce(&PRE, 2).await.unwrap(), 7);
    }

    #[test]
    fn test_error_path() {
        let timeline = timeline();
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        timeline
            .on(
                &ERROR,
                listener(move |err: &SdkError| *slot.lock().unwrap() = Some(err.code)),
            )
            .unwrap();

        timeline
            .snapshot()
            .emit_error(&SdkError::configuration("bad"));
        assert_eq!(*seen.lock().unwrap(), Some(ErrorCode::Configuration));
    }

    #[test]
    fn test_empty_timeline() {
        let timeline = timeline();
        assert!(timeline.is_empty());
        timeline
            .on(&PRE, reducer(|n: u32| async move { Ok(n) }))
            .unwrap();
        assert!(!timeline.is_empty());
        timeline.clear(&PRE).unwrap();
        assert!(timeline.is_empty());
    }
}
