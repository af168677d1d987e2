use bytes::Bytes;
use tokio::time::Duration;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::{Outcome, Store};
use crate::waiters::WaiterRegistry;
use crate::Error;

/// BLPOP is the blocking version of LPOP: it pops the head of the list stored at `key`, waiting
/// up to `timeout` for one to be pushed when the list is empty or missing. A timeout of zero
/// blocks indefinitely.
///
/// Replies with a two element array holding the key and the popped element, or with a null array
/// when the timeout elapses.
///
/// Executing a BLPOP never blocks: it only performs the immediate attempt. Waiting for a push is
/// driven by the dispatcher, see [`crate::dispatcher`].
///
/// Ref: <https://redis.io/docs/latest/commands/blpop/>
#[derive(Debug, PartialEq)]
pub struct Blpop {
    pub key: String,
    pub timeout: Option<Duration>,
}

impl Executable for Blpop {
    fn exec(self, store: &mut Store, waiters: &mut WaiterRegistry) -> Result<Frame, Error> {
        let res = pop(&self.key, store, waiters)?
            .map_or(Frame::NullArray, |element| reply(&self.key, element));

        Ok(res)
    }
}

/// Pops one element from `key`. Returns `None` when there was nothing to pop.
///
/// On success, the next waiter on `key` is signalled if elements remain, otherwise the key's
/// signal is released.
pub fn pop(
    key: &str,
    store: &mut Store,
    waiters: &mut WaiterRegistry,
) -> Result<Option<Bytes>, Error> {
    let element = match store.pop_front(key, 1)? {
        Outcome::Done(Some(popped)) => popped.into_iter().next(),
        Outcome::Done(None) | Outcome::Expired => None,
    };

    let Some(element) = element else {
        return Ok(None);
    };

    if store.contains_key(key) {
        waiters.signal(key);
    } else {
        waiters.release(key);
    }

    Ok(Some(element))
}

/// The `[key, element]` reply of a served blocked pop.
pub fn reply(key: &str, element: Bytes) -> Frame {
    Frame::bulk_array([Bytes::copy_from_slice(key.as_bytes()), element])
}

impl TryFrom<&mut CommandParser> for Blpop {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let timeout = parse_timeout(&parser.next_string()?)?;

        Ok(Self { key, timeout })
    }
}

/// Parses a timeout in seconds, fractions allowed. Zero means no timeout.
fn parse_timeout(timeout: &str) -> Result<Option<Duration>, CommandParserError> {
    let secs = timeout
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite())
        .ok_or(CommandParserError::InvalidTimeout)?;

    if secs < 0.0 {
        return Err(CommandParserError::NegativeTimeout);
    }

    if secs == 0.0 {
        return Ok(None);
    }

    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|_| CommandParserError::InvalidTimeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;

    fn blpop(key: &'static str, timeout: &'static str) -> Result<Command, Error> {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("BLPOP")),
            Frame::Bulk(Bytes::from(key)),
            Frame::Bulk(Bytes::from(timeout)),
        ]);
        Command::try_from(frame)
    }

    #[test]
    fn parse_timeouts() {
        assert_eq!(
            blpop("list", "0").unwrap(),
            Command::Blpop(Blpop {
                key: String::from("list"),
                timeout: None,
            })
        );
        assert_eq!(
            blpop("list", "0.5").unwrap(),
            Command::Blpop(Blpop {
                key: String::from("list"),
                timeout: Some(Duration::from_millis(500)),
            })
        );
        assert_eq!(
            blpop("list", "2").unwrap(),
            Command::Blpop(Blpop {
                key: String::from("list"),
                timeout: Some(Duration::from_secs(2)),
            })
        );

        // Longer than any deadline can express, left to the dispatcher to wait out.
        assert!(matches!(
            blpop("list", "1e19").unwrap(),
            Command::Blpop(Blpop {
                timeout: Some(_),
                ..
            })
        ));
    }

    #[test]
    fn invalid_timeouts() {
        assert_eq!(
            blpop("list", "-1").err().unwrap().to_string(),
            "ERR timeout is negative"
        );

        for timeout in ["soon", "inf", "NaN", ""] {
            assert_eq!(
                blpop("list", timeout).err().unwrap().to_string(),
                "ERR timeout is not a float or out of range",
                "{timeout}"
            );
        }
    }

    #[tokio::test]
    async fn pops_immediately_when_data_is_present() {
        let mut store = Store::new();
        let mut waiters = WaiterRegistry::new();
        store
            .push_back("list", vec![Bytes::from("a"), Bytes::from("b")])
            .unwrap();

        let res = blpop("list", "0")
            .unwrap()
            .exec(&mut store, &mut waiters)
            .unwrap();

        assert_eq!(res, Frame::bulk_array([Bytes::from("list"), Bytes::from("a")]));
        assert_eq!(store.range("list", 0, -1), Ok(vec![Bytes::from("b")]));
    }

    #[tokio::test]
    async fn empty_list_replies_null_array() {
        let res = blpop("list", "1")
            .unwrap()
            .exec(&mut Store::new(), &mut WaiterRegistry::new())
            .unwrap();

        assert_eq!(res, Frame::NullArray);
    }

    #[tokio::test]
    async fn pop_passes_the_signal_on_while_elements_remain() {
        let mut store = Store::new();
        let mut waiters = WaiterRegistry::new();
        let notify = waiters.subscribe("list");
        store
            .push_back("list", vec![Bytes::from("a"), Bytes::from("b")])
            .unwrap();

        assert_eq!(
            pop("list", &mut store, &mut waiters).unwrap(),
            Some(Bytes::from("a"))
        );
        notify.notified().await;

        assert_eq!(
            pop("list", &mut store, &mut waiters).unwrap(),
            Some(Bytes::from("b"))
        );
        assert!(!store.contains_key("list"));
        // Still held by `notify`, so the signal is kept.
        assert_eq!(waiters.waiting("list"), 1);
    }
}
