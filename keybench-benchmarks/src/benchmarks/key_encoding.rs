//! Primary-key encodings compared by the benchmarks
//!
//! Every encoding produces an ordered 128-bit key so the index simulator can
//! treat them uniformly. Random bits come from a seeded RNG so runs are
//! reproducible apart from the timestamp prefix of the time-ordered formats.

use chrono::Utc;
use keybench_common::KeybenchError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::{Builder, Uuid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEncoding {
    /// Sequential 64-bit integer
    Bigserial,
    /// Fully random UUID
    UuidV4,
    /// Millisecond timestamp prefix followed by random bits
    UuidV7,
    /// 48-bit millisecond timestamp and 80 random bits
    Ulid,
}

impl KeyEncoding {
    pub const ALL: [KeyEncoding; 4] = [
        KeyEncoding::Bigserial,
        KeyEncoding::UuidV4,
        KeyEncoding::UuidV7,
        KeyEncoding::Ulid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyEncoding::Bigserial => "bigserial",
            KeyEncoding::UuidV4 => "uuidv4",
            KeyEncoding::UuidV7 => "uuidv7",
            KeyEncoding::Ulid => "ulid",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            KeyEncoding::Bigserial => "sequential 64-bit integer, always appends",
            KeyEncoding::UuidV4 => "random 128-bit UUID, inserts land anywhere",
            KeyEncoding::UuidV7 => "time-ordered UUID, mostly appends",
            KeyEncoding::Ulid => "time-ordered ULID, mostly appends",
        }
    }
}

impl fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyEncoding {
    type Err = KeybenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bigserial" | "serial" => Ok(KeyEncoding::Bigserial),
            "uuidv4" | "uuid4" => Ok(KeyEncoding::UuidV4),
            "uuidv7" | "uuid7" => Ok(KeyEncoding::UuidV7),
            "ulid" => Ok(KeyEncoding::Ulid),
            other => Err(KeybenchError::Config(format!("unknown key encoding: {}", other))),
        }
    }
}

/// Produces successive keys for one encoding
#[derive(Debug)]
pub struct KeyGenerator {
    encoding: KeyEncoding,
    next_serial: u64,
    rng: StdRng,
}

impl KeyGenerator {
    pub fn new(encoding: KeyEncoding, seed: u64) -> Self {
        Self {
            encoding,
            next_serial: 1,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn encoding(&self) -> KeyEncoding {
        self.encoding
    }

    pub fn next_key(&mut self) -> u128 {
        match self.encoding {
            KeyEncoding::Bigserial => {
                let key = self.next_serial;
                self.next_serial += 1;
                key as u128
            }
            KeyEncoding::UuidV4 => Builder::from_random_bytes(self.rng.gen()).into_uuid().as_u128(),
            KeyEncoding::UuidV7 => {
                let random: [u8; 10] = self.rng.gen();
                Builder::from_unix_timestamp_millis(now_millis(), &random)
                    .into_uuid()
                    .as_u128()
            }
            KeyEncoding::Ulid => {
                let random: u128 = self.rng.gen::<u128>() & ((1u128 << 80) - 1);
                ((now_millis() as u128 & ((1u128 << 48) - 1)) << 80) | random
            }
        }
    }
}

fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Render a key the way the encoding is usually displayed
pub fn render_key(encoding: KeyEncoding, key: u128) -> String {
    match encoding {
        KeyEncoding::Bigserial => key.to_string(),
        _ => Uuid::from_u128(key).hyphenated().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_encodings() {
        for encoding in KeyEncoding::ALL {
            assert_eq!(encoding.as_str().parse::<KeyEncoding>().unwrap(), encoding);
        }
        assert_eq!("UUIDv7".parse::<KeyEncoding>().unwrap(), KeyEncoding::UuidV7);
        assert!("snowflake".parse::<KeyEncoding>().is_err());
    }

    #[test]
    fn test_bigserial_is_sequential() {
        let mut gen = KeyGenerator::new(KeyEncoding::Bigserial, 0);
        let keys: Vec<u128> = (0..5).map(|_| gen.next_key()).collect();
        assert_eq!(keys, vec![1, 2, 3, 4, 5]);
        assert_eq!(render_key(KeyEncoding::Bigserial, 42), "42");
    }

    #[test]
    fn test_uuidv4_has_version_bits() {
        let mut gen = KeyGenerator::new(KeyEncoding::UuidV4, 7);
        let uuid = Uuid::from_u128(gen.next_key());
        assert_eq!(uuid.get_version_num(), 4);
    }

    #[test]
    fn test_uuidv4_is_seeded() {
        let mut a = KeyGenerator::new(KeyEncoding::UuidV4, 99);
        let mut b = KeyGenerator::new(KeyEncoding::UuidV4, 99);
        assert_eq!(a.next_key(), b.next_key());
    }

    #[test]
    fn test_time_ordered_prefix_does_not_go_backwards() {
        for encoding in [KeyEncoding::UuidV7, KeyEncoding::Ulid] {
            let mut gen = KeyGenerator::new(encoding, 1);
            let first = gen.next_key() >> 80;
            std::thread::sleep(std::time::Duration::from_millis(2));
            let second = gen.next_key() >> 80;
            assert!(second > first, "{} prefix must advance", encoding);
        }
        let mut gen = KeyGenerator::new(KeyEncoding::UuidV7, 1);
        assert_eq!(Uuid::from_u128(gen.next_key()).get_version_num(), 7);
    }
}
