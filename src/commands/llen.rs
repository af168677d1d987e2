use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::frame::Frame;
use crate::store::{Outcome, Store};
use crate::waiters::WaiterRegistry;
use crate::Error;

/// Returns the length of the list stored at `key`. If `key` does not exist, it is interpreted as
/// an empty list and 0 is returned. An error is returned when the value stored at `key` is not a
/// list.
///
/// Ref: <https://redis.io/docs/latest/commands/llen/>
#[derive(Debug, PartialEq)]
pub struct Llen {
    pub key: String,
}

impl Executable for Llen {
    fn exec(self, store: &mut Store, _waiters: &mut WaiterRegistry) -> Result<Frame, Error> {
        match store.list_len(&self.key)? {
            Outcome::Done(len) => Ok(Frame::Integer(len as i64)),
            Outcome::Expired => Ok(Frame::Null),
        }
    }
}

impl TryFrom<&mut CommandParser> for Llen {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::commands::Command;
    use std::collections::VecDeque;
    use tokio::time::{self, Duration};

    use crate::store::{Data, StoreError, Value};

    fn llen(key: &'static str) -> Command {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("LLEN")),
            Frame::Bulk(Bytes::from(key)),
        ]);
        Command::try_from(frame).unwrap()
    }

    #[tokio::test]
    async fn existing_list() {
        let mut store = Store::new();
        store
            .push_back("list", vec![Bytes::from("a"), Bytes::from("b")])
            .unwrap();

        let res = llen("list")
            .exec(&mut store, &mut WaiterRegistry::new())
            .unwrap();

        assert_eq!(res, Frame::Integer(2));
    }

    #[tokio::test]
    async fn missing_key() {
        let res = llen("list")
            .exec(&mut Store::new(), &mut WaiterRegistry::new())
            .unwrap();

        assert_eq!(res, Frame::Integer(0));
    }

    #[tokio::test]
    async fn scalar_key() {
        let mut store = Store::new();
        store.set("key".to_string(), Bytes::from("v"), None);

        let err = llen("key")
            .exec(&mut store, &mut WaiterRegistry::new())
            .unwrap_err();

        assert_eq!(
            *err.downcast_ref::<StoreError>().unwrap(),
            StoreError::WrongType
        );
    }

    #[tokio::test(start_paused = true)]
    async fn lapsed_list_replies_nil() {
        let mut store = Store::new();
        let value = Value::new(Data::List(VecDeque::from(vec![Bytes::from("a")])))
            .with_ttl(Duration::from_millis(5));
        store.insert("list".to_string(), value);

        time::advance(Duration::from_millis(6)).await;

        let res = llen("list")
            .exec(&mut store, &mut WaiterRegistry::new())
            .unwrap();

        assert_eq!(res, Frame::Null);
        assert!(!store.contains_key("list"));
    }
}
