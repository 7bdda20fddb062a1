//! Token usage types.

use serde::{Deserialize, Serialize};

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }

    /// Overwrite with a newer report from the same response.
    ///
    /// Providers send running totals, and some split input and output
    /// counts across separate events, so a zero field never clears a
    /// previously reported one.
    pub fn absorb(&mut self, report: &Usage) {
        if report.input_tokens > 0 {
            self.input_tokens = report.input_tokens;
        }
        if report.output_tokens > 0 {
            self.output_tokens = report.output_tokens;
        }
    }

    /// Merge usage from another request of the same turn (accumulate).
    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_keeps_fields_missing_from_later_reports() {
        let mut usage = Usage::default();
        usage.absorb(&Usage::new(12, 0));
        usage.absorb(&Usage::new(0, 1));
        usage.absorb(&Usage::new(0, 30));
        assert_eq!(usage, Usage::new(12, 30));
    }

    #[test]
    fn merge_accumulates() {
        let mut usage = Usage::new(10, 5);
        usage.merge(&Usage::new(20, 7));
        assert_eq!(usage.total_tokens(), 42);
    }
}
