// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::{Context, Result};
use method_flow::{LabelFlow, MethodEvent};

use crate::filter::{CoverageFilter, NoFilter};
use crate::finally::FinallyResolver;
use crate::graph::FlowBuilder;
use crate::options::AnalyzerOptions;
use crate::probes::ProbeData;
use crate::report::MethodCoverage;

/// Computes the coverage of one method from its probed event stream.
pub struct MethodAnalyzer<'a> {
    name: String,
    desc: String,
    signature: Option<String>,
    probes: Option<&'a [bool]>,
    filter: Box<dyn CoverageFilter + 'a>,
    options: AnalyzerOptions,
}

impl<'a> MethodAnalyzer<'a> {
    pub fn new(name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: desc.into(),
            signature: None,
            probes: None,
            filter: Box::new(NoFilter),
            options: AnalyzerOptions::default(),
        }
    }

    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Execution flags of the probes of the class. Without them, no probe is
    /// considered executed.
    pub fn probes(mut self, probes: Option<&'a [bool]>) -> Self {
        self.probes = probes;
        self
    }

    pub fn filter(mut self, filter: impl CoverageFilter + 'a) -> Self {
        self.filter = Box::new(filter);
        self
    }

    pub fn options(mut self, options: AnalyzerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn analyze(mut self, events: &[MethodEvent]) -> Result<MethodCoverage> {
        let labels = LabelFlow::analyze(events)
            .with_context(|| format!("unable to analyze method {}{}", self.name, self.desc))?;

        let probes = ProbeData::new(self.probes);

        let mut builder = FlowBuilder::new(&labels, probes, &mut *self.filter);
        for event in events {
            builder.visit(event);
        }
        let mut graph = builder.finish();

        let ends = if self.options.merge_finally_duplicates {
            FinallyResolver::new(&mut graph, probes, &self.options.finally_shape).resolve()
        } else {
            vec![]
        };

        graph.propagate_probes();
        graph.merge_finally_ends(&ends);

        let mut coverage = MethodCoverage::new(self.name, self.desc, self.signature);
        coverage.report(graph.first_line, graph.last_line, &graph.insns);

        debug!(
            "{}{}: {} instructions, {} merged finally blocks, instructions {:?}, branches {:?}",
            coverage.name,
            coverage.desc,
            graph.insns.len(),
            ends.len(),
            coverage.counters.instructions,
            coverage.counters.branches,
        );

        Ok(coverage)
    }
}
