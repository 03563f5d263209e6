// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use method_flow::ProbeId;

/// Execution flags recorded for the probes of a class.
///
/// `None` means the class was never executed, so no probe fired.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProbeData<'a> {
    probes: Option<&'a [bool]>,
}

impl<'a> ProbeData<'a> {
    pub fn new(probes: Option<&'a [bool]>) -> Self {
        Self { probes }
    }

    /// Returns `true` if `probe` fired.
    ///
    /// # Panics
    ///
    /// Panics if `probe` is outside the recorded probe array, which means the
    /// data does not belong to the instrumented class.
    pub fn executed(&self, probe: ProbeId) -> bool {
        match self.probes {
            Some(probes) => probes[probe.index()],
            None => false,
        }
    }

    pub fn is_recorded(&self) -> bool {
        self.probes.is_some()
    }
}
