//! # sans_reduce
//!
//! sans_reduce is a data reduction engine for the ISIS small-angle neutron
//! scattering (SANS) instruments (LARMOR, LOQ, SANS2D, and ZOOM), written in
//! Rust. It takes raw time-of-flight scattering data and reduces it to
//! scattering curves of intensity against momentum transfer Q, including
//! background (can) subtraction and the stitching of the low-angle and
//! high-angle detector banks into a single curve.
//!
//! ## Installation
//!
//! In the future we may deploy to crates.io, but currently the only method of
//! install is from source, which is laid out below.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the
//! Rust tool chain. See the [Rust docs](https://www.rust-lang.org/tools/install)
//! for installation instructions.
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./sans_reduce_cli`
//! from the top level sans_reduce repository.
//!
//! The binary will be installed to your cargo install location (typically
//! something like `~/.cargo/bin/`). It can be uninstalled by running
//! `cargo uninstall sans_reduce_cli`. Once installed it will be in your path,
//! so you can simply invoke it from the command line.
//!
//! ## The reduction
//!
//! Each run is reduced by a fixed pipeline: event slicing, unit conversion to
//! wavelength, wavelength cropping, detector geometry corrections, masking,
//! normalization, and conversion to Q. Counts and normalization are carried
//! as two separate accumulations through the whole pipeline and divided only
//! at the end; the undivided pair is what allows a background (can) reduction
//! to be cached and recombined with any sample that shares its configuration.
//!
//! When a merged reduction is requested, both banks are reduced and the
//! high-angle bank is stitched onto the low-angle bank by a least-squares fit
//! of a scale and shift over the overlapping Q region.
//!
//! ## Configuration
//!
//! A reduction batch is described by a YAML file. A template can be generated
//! with `sans_reduce_cli new -p config.yaml`. The format is as follows:
//!
//! ```yml
//! instrument: SANS2D
//! data_path: None
//! output_path: None
//! first_run_number: 0
//! last_run_number: 0
//! can_run: null
//! monitor_run: null
//! sample_transmission_run: null
//! sample_direct_run: null
//! can_transmission_run: null
//! can_direct_run: null
//! reduction_mode: Lab
//! merge_fit_mode: Both
//! merge_shift: 0.0
//! merge_scale: 1.0
//! merge_min: null
//! merge_max: null
//! wavelength_min: 1.75
//! wavelength_max: 16.5
//! wavelength_step: 0.125
//! q_min: 0.001
//! q_max: 1.0
//! q_step: 0.002
//! q_xy_max: null
//! q_xy_step: null
//! scale_factor: 1.0
//! slice_start: null
//! slice_stop: null
//! bin_mask_start: []
//! bin_mask_stop: []
//! spectrum_mask: []
//! radius_min: -1.0
//! radius_max: -1.0
//! use_gravity: false
//! gravity_extra_length: 0.0
//! n_threads: 1
//! ```
//!
//! Run data files are located by the instrument naming convention
//! (`SANS2D00022024.yaml` for run 22024 of SANS2D) under `data_path`. The
//! `can_run`, `monitor_run`, and transmission/direct fields name files under
//! the same directory. Transmission and direct entries come in pairs; when
//! both are given, the reduction divides out the wavelength-dependent
//! transmitted fraction.
//!
//! ## Output
//!
//! For each run the requested curves are written to `output_path`: a
//! `_LAB.yaml` and/or `_HAB.yaml` per-bank curve, and a `_Merged.yaml` curve
//! when stitching is requested. The fitted merge scale and shift are logged
//! for every stitched run.
pub mod algorithms;
pub mod bundles;
pub mod cache;
pub mod config;
pub mod error;
pub mod instrument;
pub mod merge;
pub mod postprocess;
pub mod process;
pub mod reduction;
pub mod state;
pub mod worker_status;
pub mod workspace;
