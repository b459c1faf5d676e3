pub mod common;
pub mod convert_to_q;
pub mod mask;
pub mod validate;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::StateError;
use crate::instrument::SansInstrument;

use common::{
    StateData, StateDataBuilder, StateMove, StateMoveBuilder, StateReduction, StateScale,
    StateSlice, StateWavelength, StateWavelengthBuilder,
};
use convert_to_q::{StateConvertToQ, StateConvertToQBuilder};
use mask::{StateMask, StateMaskBuilder};
use validate::ValidationReport;

/// Deterministic digest of a serialized state graph.
///
/// The hash is seed-free, so the same configuration produces the same value
/// across process runs. It keys the optimization cache and tags audit logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateHash(pub u64);

impl std::fmt::Display for StateHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// The full, validated description of one reduction.
///
/// Built once per reduction request via [`SansStateBuilder`] and treated as
/// read-only afterwards. Every sub-state contributes its violations to one
/// aggregate report at build time; a state that fails validation is never
/// handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SansState {
    pub instrument: SansInstrument,
    pub data: StateData,
    pub mov: StateMove,
    pub wavelength: StateWavelength,
    pub scale: StateScale,
    pub slice: StateSlice,
    pub mask: StateMask,
    pub convert_to_q: StateConvertToQ,
    pub reduction: StateReduction,
}

impl SansState {
    /// Run every sub-state validation and aggregate all violations
    pub fn validate(&self) -> Result<(), StateError> {
        let mut report = ValidationReport::new();
        self.data.validate(&mut report);
        self.mov.validate(&mut report);
        self.wavelength.validate(&mut report);
        self.scale.validate(&mut report);
        self.slice.validate(&mut report);
        self.mask.validate(&mut report);
        self.convert_to_q.validate(&mut report);
        self.reduction.validate(self.instrument, &mut report);
        // Cross-substate invariant: the bank stitch is a 1D operation
        if self.reduction.wants_merge()
            && self.convert_to_q.dimensionality == convert_to_q::ReductionDimensionality::TwoDim
        {
            report.add("reduction.mode", "bank merging requires a 1D reduction");
        }
        if report.is_empty() {
            Ok(())
        } else {
            Err(StateError::InvalidState(report))
        }
    }

    /// Stable hash over the canonical YAML serialization of the state
    pub fn hash(&self) -> Result<StateHash, StateError> {
        let serialized = serde_yaml::to_string(self)?;
        Ok(StateHash(fxhash::hash64(serialized.as_bytes())))
    }

    /// The state copy used to key and run a can reduction.
    ///
    /// The can scatter entry becomes the scatter data and the sample-only run
    /// fields are cleared, so every sample sharing this can configuration
    /// maps to the same cache key. Returns None when no can is configured.
    pub fn can_variant(&self) -> Option<SansState> {
        let can_scatter = self.data.can_scatter.clone()?;
        let mut state = self.clone();
        state.data = StateData {
            sample_scatter: can_scatter,
            sample_transmission: self.data.can_transmission.clone(),
            sample_direct: self.data.can_direct.clone(),
            can_scatter: None,
            can_transmission: None,
            can_direct: None,
        };
        Some(state)
    }
}

/// Builder for a [`SansState`]. One sub-builder per sub-state, all selected
/// by the instrument identity given at construction.
#[derive(Debug, Clone)]
pub struct SansStateBuilder {
    instrument: SansInstrument,
    data: StateDataBuilder,
    mov: StateMoveBuilder,
    wavelength: StateWavelengthBuilder,
    scale: StateScale,
    slice: StateSlice,
    mask: StateMaskBuilder,
    convert_to_q: StateConvertToQBuilder,
    reduction: StateReduction,
}

impl SansStateBuilder {
    pub fn new(instrument: SansInstrument) -> Self {
        Self {
            instrument,
            data: StateDataBuilder::new(instrument),
            mov: StateMoveBuilder::new(instrument),
            wavelength: StateWavelengthBuilder::new(instrument),
            scale: StateScale::default(),
            slice: StateSlice::default(),
            mask: StateMaskBuilder::new(instrument),
            convert_to_q: StateConvertToQBuilder::new(instrument),
            reduction: StateReduction::default(),
        }
    }

    /// Select the builder family from an instrument name; unknown names are a
    /// typed unsupported-instrument error, not a panic.
    pub fn from_name(name: &str) -> Result<Self, StateError> {
        Ok(Self::new(SansInstrument::from_str(name)?))
    }

    pub fn instrument(&self) -> SansInstrument {
        self.instrument
    }

    pub fn with_data(mut self, f: impl FnOnce(StateDataBuilder) -> StateDataBuilder) -> Self {
        self.data = f(self.data);
        self
    }

    pub fn with_move(mut self, f: impl FnOnce(StateMoveBuilder) -> StateMoveBuilder) -> Self {
        self.mov = f(self.mov);
        self
    }

    pub fn with_wavelength(
        mut self,
        f: impl FnOnce(StateWavelengthBuilder) -> StateWavelengthBuilder,
    ) -> Self {
        self.wavelength = f(self.wavelength);
        self
    }

    pub fn with_mask(mut self, f: impl FnOnce(StateMaskBuilder) -> StateMaskBuilder) -> Self {
        self.mask = f(self.mask);
        self
    }

    pub fn with_convert_to_q(
        mut self,
        f: impl FnOnce(StateConvertToQBuilder) -> StateConvertToQBuilder,
    ) -> Self {
        self.convert_to_q = f(self.convert_to_q);
        self
    }

    pub fn scale_factor(mut self, factor: f64) -> Self {
        self.scale = StateScale { factor };
        self
    }

    pub fn slice_window(mut self, start: f64, stop: f64) -> Self {
        self.slice = StateSlice {
            start: Some(start),
            stop: Some(stop),
        };
        self
    }

    pub fn reduction(mut self, reduction: StateReduction) -> Self {
        self.reduction = reduction;
        self
    }

    /// Assemble the aggregate and validate it. All violations across every
    /// sub-state are gathered into a single error.
    pub fn build(&self) -> Result<SansState, StateError> {
        let state = SansState {
            instrument: self.instrument,
            data: self.data.clone().build(),
            mov: self.mov.clone().build(),
            wavelength: self.wavelength.clone().build(),
            scale: self.scale.clone(),
            slice: self.slice.clone(),
            mask: self.mask.clone().build(),
            convert_to_q: self.convert_to_q.clone().build(),
            reduction: self.reduction.clone(),
        };
        state.validate()?;
        Ok(state)
    }
}
