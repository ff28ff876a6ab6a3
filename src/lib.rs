#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

pub mod error;
pub use error::{CoreError, Result};

pub mod ast;
pub mod backend;
pub mod collector;
pub mod compiler_instance;
pub mod config;
pub mod diagnostic;
pub mod disk_cache;
pub mod engine;
pub mod graph;
pub mod iface_cache;
pub mod lru;
pub mod manifest;
pub mod pkg;
pub mod symbol;
pub mod task_pool;
pub mod transport;
pub mod watchdog;

pub use backend::{CompileBackend, MockBackend};
pub use collector::Collector;
pub use compiler_instance::CompilerInstance;
pub use config::{CacheConfig, EngineConfig};
pub use diagnostic::{Diagnostic, Severity};
pub use disk_cache::DiskCache;
pub use engine::WorkspaceEngine;
pub use graph::DependencyGraph;
pub use iface_cache::{FreshnessStatus, InterfaceCache};
pub use lru::LruCache;
pub use manifest::ModuleInfo;
pub use pkg::PkgInfo;
pub use task_pool::TaskPool;
pub use transport::{read_frame, write_frame, Frame};
pub use watchdog::Watchdog;

/// Test-only fixtures for building disposable on-disk workspaces, mirroring
/// the teacher's own `project_util` — never compiled into a consumer's
/// binary.
#[cfg(test)]
pub mod testkit;
