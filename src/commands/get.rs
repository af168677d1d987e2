use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::frame::Frame;
use crate::store::Store;
use crate::waiters::WaiterRegistry;
use crate::Error;

/// Get the value of `key`. If the key does not exist the special value `nil` is returned. An
/// error is returned if the value stored at `key` is a list.
///
/// Ref: <https://redis.io/docs/latest/commands/get/>
#[derive(Debug, PartialEq)]
pub struct Get {
    pub key: String,
}

impl Executable for Get {
    fn exec(self, store: &mut Store, _waiters: &mut WaiterRegistry) -> Result<Frame, Error> {
        let value = store.get(&self.key)?;

        match value {
            Some(value) => Ok(Frame::Bulk(value)),
            None => Ok(Frame::Null),
        }
    }
}

impl TryFrom<&mut CommandParser> for Get {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::store::StoreError;
    use bytes::Bytes;
    use tokio::time::{self, Duration};

    fn get(key: &'static str) -> Command {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("GET")),
            Frame::Bulk(Bytes::from(key)),
        ]);
        Command::try_from(frame).unwrap()
    }

    #[tokio::test]
    async fn existing_key() {
        let cmd = get("key1");

        assert_eq!(
            cmd,
            Command::Get(Get {
                key: String::from("key1")
            })
        );

        let mut store = Store::new();
        store.set(String::from("key1"), Bytes::from("1"), None);

        let result = cmd.exec(&mut store, &mut WaiterRegistry::new()).unwrap();

        assert_eq!(result, Frame::Bulk(Bytes::from("1")));
    }

    #[tokio::test]
    async fn missing_key() {
        let result = get("key1")
            .exec(&mut Store::new(), &mut WaiterRegistry::new())
            .unwrap();

        assert_eq!(result, Frame::Null);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_key_is_reported_missing_once() {
        let mut store = Store::new();
        let mut waiters = WaiterRegistry::new();
        store.set(
            String::from("key1"),
            Bytes::from("1"),
            Some(Duration::from_millis(100)),
        );

        time::advance(Duration::from_millis(101)).await;

        assert_eq!(get("key1").exec(&mut store, &mut waiters).unwrap(), Frame::Null);
        assert!(!store.contains_key("key1"));
        assert_eq!(get("key1").exec(&mut store, &mut waiters).unwrap(), Frame::Null);
    }

    #[tokio::test]
    async fn list_key() {
        let mut store = Store::new();
        store.push_back("list", vec![Bytes::from("a")]).unwrap();

        let err = get("list")
            .exec(&mut store, &mut WaiterRegistry::new())
            .unwrap_err();

        assert_eq!(
            *err.downcast_ref::<StoreError>().unwrap(),
            StoreError::WrongType
        );
    }
}
