use std::sync::Arc;

use crate::Event;

/// Reacts to an event synchronously, inside the unit of work that raised it.
///
/// Code that persists an entity calls its registered handlers directly after
/// the write, so every side effect is visible at the call site. There is no
/// queue and no retry: a handler runs exactly once per `handle` call and its
/// error is returned to whoever performed the write.
///
/// Handlers must not raise the event they are handling. Work they persist
/// should go through plain repository writes, which notify nobody.
pub trait EventHandler<E: Event>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn handle(&self, event: &E) -> Result<(), Self::Error>;
}

impl<E, H> EventHandler<E> for Arc<H>
where
    E: Event,
    H: EventHandler<E> + ?Sized,
{
    type Error = H::Error;

    fn handle(&self, event: &E) -> Result<(), Self::Error> {
        (**self).handle(event)
    }
}

/// Deliver `event` to each handler in registration order.
///
/// Stops at the first failing handler and returns its error.
pub fn notify_all<E, H>(handlers: &[H], event: &E) -> Result<(), H::Error>
where
    E: Event,
    H: EventHandler<E>,
{
    for handler in handlers {
        handler.handle(event)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{DateTime, Utc};

    use super::*;

    #[derive(Debug, Clone)]
    struct Ping(u32);

    impl Event for Ping {
        fn event_type(&self) -> &'static str {
            "test.ping"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<u32>>,
        fail_on: Option<u32>,
    }

    impl EventHandler<Ping> for Recorder {
        type Error = String;

        fn handle(&self, event: &Ping) -> Result<(), Self::Error> {
            if self.fail_on == Some(event.0) {
                return Err(format!("refused {}", event.0));
            }
            self.seen.lock().unwrap().push(event.0);
            Ok(())
        }
    }

    #[test]
    fn notifies_every_handler_once() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let handlers = vec![a.clone(), b.clone()];

        notify_all(&handlers, &Ping(7)).unwrap();

        assert_eq!(*a.seen.lock().unwrap(), vec![7]);
        assert_eq!(*b.seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn stops_at_first_failure() {
        let failing = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            fail_on: Some(3),
        });
        let after = Arc::new(Recorder::default());
        let handlers = vec![failing, after.clone()];

        let err = notify_all(&handlers, &Ping(3)).unwrap_err();

        assert_eq!(err, "refused 3");
        assert!(after.seen.lock().unwrap().is_empty());
    }
}
