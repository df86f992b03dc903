//! Small helpers shared across the crate.

// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use slog::{OwnedKVList, Record, KV};
use std::fmt;
use std::fmt::Write;

struct FormatKeyValueList {
    pub buffer: String,
}

impl slog::Serializer for FormatKeyValueList {
    fn emit_arguments(&mut self, key: slog::Key, val: &fmt::Arguments) -> slog::Result {
        if !self.buffer.is_empty() {
            write!(&mut self.buffer, ", {}: {}", key, val).unwrap();
        } else {
            write!(&mut self.buffer, "{}: {}", key, val).unwrap();
        }
        Ok(())
    }
}

pub(crate) fn format_kv_list(kv_list: &OwnedKVList) -> String {
    let mut formatter = FormatKeyValueList {
        buffer: "".to_owned(),
    };
    let record = record_static!(slog::Level::Trace, "");
    kv_list
        .serialize(
            &Record::new(&record, &format_args!(""), b!()),
            &mut formatter,
        )
        .unwrap();
    formatter.buffer
}

/// Get the majority number of given nodes count.
#[inline]
pub fn majority(total: usize) -> usize {
    (total / 2) + 1
}

#[cfg(test)]
mod tests {
    use super::majority;

    #[test]
    fn test_majority() {
        let tests = vec![(1, 1), (2, 2), (3, 2), (4, 3), (5, 3), (7, 4), (9, 5)];
        for (total, want) in tests {
            assert_eq!(majority(total), want, "majority({})", total);
        }
    }
}
