// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A small line-oriented config text builder, following the `ConfigBuilder`/`Render`/`Rendered`
//! shape the retrieval pack's FRR renderer uses: types implement [`Rendered`] for an inline
//! string fragment, or [`Render`] for a whole block of lines accumulated via `+=`.

use std::ops::AddAssign;

/// An accumulating buffer of rendered configuration lines.
#[derive(Default, Debug, Clone)]
pub struct ConfigBuilder {
    lines: Vec<String>,
}

impl ConfigBuilder {
    /// A fresh, empty builder.
    #[must_use]
    pub fn new() -> Self {
        ConfigBuilder::default()
    }

    /// Render the accumulated lines as one newline-terminated string.
    #[must_use]
    pub fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

impl AddAssign<&str> for ConfigBuilder {
    fn add_assign(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}

impl AddAssign<String> for ConfigBuilder {
    fn add_assign(&mut self, line: String) {
        self.lines.push(line);
    }
}

impl AddAssign<ConfigBuilder> for ConfigBuilder {
    fn add_assign(&mut self, other: ConfigBuilder) {
        self.lines.extend(other.lines);
    }
}

/// A type that renders to a block of configuration lines, given some context.
pub trait Render {
    /// Whatever the renderer needs beyond `self` (e.g. a section name or sequence counter).
    type Context;
    /// Render `self` into a [`ConfigBuilder`].
    fn render(&self, context: &Self::Context) -> ConfigBuilder;
}

/// A type that renders to a single inline string fragment (no context needed).
pub trait Rendered {
    /// Render `self` as a fragment of a single config line.
    fn rendered(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_joins_lines_with_trailing_newline() {
        let mut cfg = ConfigBuilder::new();
        cfg += "a";
        cfg += "b".to_string();
        assert_eq!(cfg.finish(), "a\nb\n");
    }
}
