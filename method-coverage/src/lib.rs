// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#[macro_use]
extern crate log;

pub mod analyzer;
pub mod atom;
pub mod counter;
pub mod filter;
pub mod finally;
pub mod graph;
pub mod instruction;
pub mod options;
pub mod probes;
pub mod report;
pub mod try_catch;


pub use analyzer::MethodAnalyzer;
pub use counter::{Counter, CoverageStatus};
pub use filter::{CoverageFilter, NoFilter, SynchronizedFilter};
pub use options::{AnalyzerOptions, FinallyShape};
pub use report::{LineCoverage, MethodCounters, MethodCoverage};
