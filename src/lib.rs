#![doc = "svgpng-batch: core logic for batch SVG/PNG conversion."]

//! This crate holds the data model, intake validation, conversion engine,
//! queue runner, session store and ZIP packaging. Front-ends (the CLI in
//! `svgpng-batch-cli`, or any other shell) only call these operations and
//! render the store's state.
//!
//! # Flow
//! raw files → [`intake::intake`] → [`session::SessionStore::ingest`] →
//! [`queue::QueueRunner::drive`] → [`archive::build_archive`] /
//! [`archive::save_output`].

pub mod archive;
pub mod config;
pub mod contract;
pub mod engine;
pub mod intake;
pub mod item;
pub mod queue;
pub mod session;

pub use archive::{build_archive, save_output, ArchiveBlob, ArchiveError};
pub use config::Config;
pub use contract::{ConversionError, ConversionRequest, Converter};
pub use engine::Engine;
pub use intake::{intake, IntakeError, IntakeOutcome, RawFile, Rejection};
pub use item::{ConversionItem, ConvertedOutput, Format, ItemStatus, StatusKind};
pub use queue::QueueRunner;
pub use session::{BatchReport, SessionCounts, SessionPhase, SessionStore};
