//! Gradmesh is an adaptive mesh library for finite-volume solvers on
//! hierarchical Cartesian grids. The mesh is a tiling of the domain by leaves
//! at different refinement levels, stored level by level as sets of
//! intervals along the primary axis. Around the leaves, the mesh maintains
//! the ghost cells which stencil operations need, filled by projection from
//! finer data, prediction from coarser data, periodic images, a boundary
//! condition, or exchange with the neighbouring ranks of a distributed run.
//! The leaves are adapted one level at a time from per-cell tags, and kept
//! graduated: touching leaves never differ by more than one level.

pub mod adapt;
pub mod boundary;
pub mod cell_array;
pub mod config;
pub mod domain;
pub mod error;
pub mod field;
pub mod graduation;
pub mod halo;
pub mod index_space;
pub mod interval;
pub mod interval_set;
pub mod mesh;
pub mod message;
pub mod observer;
pub mod operators;
pub mod subset;
pub mod tag;
pub mod update;

pub use adapt::adapt_one_step;
pub use boundary::{BoundaryCondition, Dirichlet};
pub use cell_array::{CellArray, CellList};
pub use config::Config;
pub use domain::Domain;
pub use error::{Error, Result};
pub use field::Field;
pub use index_space::IndexBox;
pub use interval::Interval;
pub use interval_set::IntervalSet;
pub use mesh::{Mesh, MeshRole};
pub use observer::{Observer, Phase, Silent, Timers};
pub use subset::LevelSet;
pub use tag::{Action, Tag};
pub use update::update_ghosts;
