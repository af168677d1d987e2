use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::frame::Frame;
use crate::store::Store;
use crate::waiters::WaiterRegistry;
use crate::Error;

/// Returns the specified elements of the list stored at `key`. The offsets `start` and `stop` are
/// zero-based indexes and both inclusive; negative offsets count from the end of the list.
///
/// Out of range indexes do not produce an error: a `start` past the end of the list yields an
/// empty list, a `stop` past the end is treated as the last element.
///
/// Ref: <https://redis.io/docs/latest/commands/lrange/>
#[derive(Debug, PartialEq)]
pub struct Lrange {
    pub key: String,
    pub start: i64,
    pub stop: i64,
}

impl Executable for Lrange {
    fn exec(self, store: &mut Store, _waiters: &mut WaiterRegistry) -> Result<Frame, Error> {
        let items = store.range(&self.key, self.start, self.stop)?;

        Ok(Frame::bulk_array(items))
    }
}

impl TryFrom<&mut CommandParser> for Lrange {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let start = parser.next_integer()?;
        let stop = parser.next_integer()?;

        Ok(Self { key, start, stop })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::commands::{Command, CommandParserError};

    fn lrange(start: &'static str, stop: &'static str) -> Result<Command, Error> {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("LRANGE")),
            Frame::Bulk(Bytes::from("list")),
            Frame::Bulk(Bytes::from(start)),
            Frame::Bulk(Bytes::from(stop)),
        ]);
        Command::try_from(frame)
    }

    fn exec(cmd: Command) -> Frame {
        let mut store = Store::new();
        store
            .push_back(
                "list",
                vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")],
            )
            .unwrap();

        cmd.exec(&mut store, &mut WaiterRegistry::new()).unwrap()
    }

    #[tokio::test]
    async fn whole_list() {
        let cmd = lrange("0", "-1").unwrap();

        assert_eq!(
            cmd,
            Command::Lrange(Lrange {
                key: String::from("list"),
                start: 0,
                stop: -1,
            })
        );

        assert_eq!(
            exec(cmd),
            Frame::bulk_array([Bytes::from("a"), Bytes::from("b"), Bytes::from("c")])
        );
    }

    #[tokio::test]
    async fn out_of_range_indexes_are_clamped() {
        assert_eq!(
            exec(lrange("-100", "100").unwrap()),
            Frame::bulk_array([Bytes::from("a"), Bytes::from("b"), Bytes::from("c")])
        );
        assert_eq!(exec(lrange("5", "10").unwrap()), Frame::Array(vec![]));
        assert_eq!(
            exec(lrange("-2", "-1").unwrap()),
            Frame::bulk_array([Bytes::from("b"), Bytes::from("c")])
        );
    }

    #[tokio::test]
    async fn missing_key() {
        let res = lrange("0", "-1")
            .unwrap()
            .exec(&mut Store::new(), &mut WaiterRegistry::new())
            .unwrap();

        assert_eq!(res, Frame::Array(vec![]));
    }

    #[test]
    fn non_numeric_index() {
        let err = lrange("zero", "-1").err().unwrap();

        assert_eq!(
            *err.downcast_ref::<CommandParserError>().unwrap(),
            CommandParserError::NotAnInteger
        );
    }
}
