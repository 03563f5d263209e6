// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct AnalyzerOptions {
    /// Merge the coverage of compiler-duplicated `finally` blocks.
    pub merge_finally_duplicates: bool,

    pub finally_shape: FinallyShape,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            merge_finally_duplicates: true,
            finally_shape: FinallyShape::default(),
        }
    }
}

/// Atom offsets describing how `javac` lays out the copies of a `finally`
/// block.
///
/// The defaults match the layout `javac` emits. A layout that does not fit
/// these offsets is left unmerged.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct FinallyShape {
    /// Atoms between a copy's entry label and its first atom.
    pub region_entry_skip: isize,

    /// Extra atoms at the start of the catch-all copy: the store of the caught
    /// exception and the label after it.
    pub catch_all_extra_skip: isize,

    /// Atoms checked for an `ATHROW` before the end of a catch range. A throw
    /// there means the catch handler rethrows instead of running an inlined
    /// copy.
    pub athrow_lookbehind: isize,

    /// Window, relative to the end of the first try range, that is searched
    /// for the `GOTO` jumping over the handlers to the no-exception copy.
    pub goto_lookbehind: isize,
    pub goto_lookahead: isize,

    /// Distance from the first handler label to the end of the first try range
    /// at which that end label is the handler's own entry rather than a
    /// no-exception copy.
    pub handler_adjacency: isize,

    /// Advance of the catch-all cursor from its trailing probe to the rethrow.
    pub probe_tail_primary_advance: isize,

    /// Advance of the catch handler copies from their last aligned
    /// instruction to their closing instruction.
    pub tail_duplicate_advance: isize,

    /// Window searched after the last aligned catch-all instruction for its
    /// closing instruction.
    pub end_search_min: isize,
    pub end_search_max: isize,
}

impl Default for FinallyShape {
    fn default() -> Self {
        Self {
            region_entry_skip: 1,
            catch_all_extra_skip: 2,
            athrow_lookbehind: 3,
            goto_lookbehind: 1,
            goto_lookahead: 3,
            handler_adjacency: 2,
            probe_tail_primary_advance: 4,
            tail_duplicate_advance: 2,
            end_search_min: 3,
            end_search_max: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_options_partial_config() -> Result<()> {
        let text = r#"{ "finally_shape": { "goto_lookahead": 5 } }"#;
        let options: AnalyzerOptions = serde_json::from_str(text)?;

        assert!(options.merge_finally_duplicates);
        assert_eq!(options.finally_shape.goto_lookahead, 5);
        assert_eq!(options.finally_shape.goto_lookbehind, 1);

        let text = r#"{ "merge_finally_duplicates": false }"#;
        let options: AnalyzerOptions = serde_json::from_str(text)?;

        assert!(!options.merge_finally_duplicates);
        assert_eq!(options.finally_shape, FinallyShape::default());

        Ok(())
    }
}
