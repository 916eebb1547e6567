//! IR data model for the Shrike bytecode optimizer.
//!
//! This crate holds everything the optimization passes consume:
//! - Descriptor-based references to types, fields and methods
//! - A class hierarchy with field/method resolution queries
//! - Register-based IR instructions and values
//! - Control-flow graphs with normal and exceptional edges
//! - A block-structured builder for constructing method IR

pub mod cfg;
pub mod code;
pub mod hierarchy;
pub mod instruction;
pub mod method;
pub mod refs;

pub use cfg::{BasicBlock, BlockId, Cfg};
pub use code::{IrBuildError, IrBuilder, IrCode, ValueInfo};
pub use hierarchy::{AppView, ClassDef, ClassKind, InstanceInitializerInfo, ResolvedMethod};
pub use instruction::{InstrId, InstrKind, Instruction, MonitorKind, ValueId};
pub use method::MethodDef;
pub use refs::{FieldRef, MethodRef, TypeRef};
