//! # eightpi_unpacker
//!
//! eightpi_unpacker is the event builder for the 8pi spectrometer, written in
//! Rust. It takes the MIDAS files written by the data acquisition frontend,
//! decodes the FERA electronics streams of the four detector families
//! (germanium, plastic, silicon, barium fluoride), corrects the hardware
//! clock for 32-bit overflows and assembles time-coincident hits into built
//! events.
//!
//! ## Building & Install
//!
//! To build and install the CLI unpacker use
//! `cargo install --path ./eightpi_unpacker_cli` from the top level
//! repository.
//!
//! ## Configuration
//!
//! The unpacker is configured through a YAML file; a template can be written
//! with the CLI `new` subcommand. The per-detector-type sections set the
//! number of detectors, the largest legal raw channel, the list of switched
//! off detectors and the coarse TDC window used to select the reported TDC
//! time. The remaining fields control event building and the pipeline:
//!
//! ```yml
//! germanium:
//!   nof_detectors: 20
//!   max_channel: 16384
//!   inactive_detectors: []
//!   coarse_tdc_window: [0, 65535]
//! # plastic, silicon, baf2 analogous
//! waiting_window: 10000000
//! coincidence_window: 20
//! read_buffer_size: 16384
//! max_read_buffer_size: 4194304
//! built_buffer_size: 1024
//! max_built_buffer_size: 1048576
//! buffer_retry_millis: 10
//! buffer_retries: 10
//! flush_timeout_secs: 60
//! status_update: false
//! ```
//!
//! The windows are in 100 ns ULM clock ticks: a pending hit is settled once
//! the newest pending hit is at least `waiting_window` ticks younger, and
//! hits within `coincidence_window` ticks of the oldest settled hit form one
//! built event.
//!
//! ## Pipeline
//!
//! Decoding runs on the caller's thread; event building and output run on
//! worker threads behind bounded, growable buffers. `MidasEventProcessor`
//! drives the whole thing:
//!
//! ```text
//! MidasFileManager -> process() -> [pending hits] -> builder thread
//!                                   -> [built events] -> sink thread
//! ```
//!
//! Built events are handed to a [`sink::EventSink`]; the CLI writes
//! tab-separated text with one row per hit.

pub mod bank;
pub mod buffer;
pub mod calibrate;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod event_builder;
pub mod fera;
pub mod midas_file;
pub mod processor;
pub mod sink;
