use clap::Parser;

use crate::codec::DEFAULT_MAX_FRAME_SIZE;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Server settings. Every flag can also be given through its environment variable.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "redlist", version, about = "An in-memory key-value store speaking RESP")]
pub struct Config {
    /// The interface to listen on
    #[arg(long, env = "REDLIST_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// The port to listen on
    #[arg(short, long, env = "REDLIST_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum number of bytes buffered for a single request
    #[arg(long, env = "REDLIST_MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,

    /// Number of requests queued for the dispatcher before clients are back-pressured
    #[arg(
        long,
        env = "REDLIST_QUEUE_CAPACITY",
        default_value_t = DEFAULT_QUEUE_CAPACITY,
        value_parser = parse_capacity
    )]
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

fn parse_capacity(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(capacity) => Ok(capacity),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["redlist"]).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn flags() {
        let config = Config::try_parse_from([
            "redlist",
            "--host",
            "0.0.0.0",
            "-p",
            "7000",
            "--max-frame-size",
            "1024",
            "--queue-capacity",
            "8",
        ])
        .unwrap();

        assert_eq!(
            config,
            Config {
                host: "0.0.0.0".to_string(),
                port: 7000,
                max_frame_size: 1024,
                queue_capacity: 8,
            }
        );
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(Config::try_parse_from(["redlist", "--queue-capacity", "0"]).is_err());
    }
}
