//! `peimage` reads, edits, and rewrites Portable Executable (PE) image
//! files: the COFF header, the PE32/PE32+ optional header, the data
//! directory array, the section table and its payloads, and the attribute
//! certificate table.
//!
//! The entry point is [`pe::Image::parse`]. Edit the section list through
//! [`pe::Image::sections`]/[`pe::Image::sections_mut`], call
//! [`pe::Image::recalculate`] to re-derive the geometry fields that follow
//! from those edits, then [`pe::Image::store`] to serialize back to bytes.
//!
//! This crate does not execute or load images, resolve imports/exports, walk
//! resource trees, or validate certificates — see `SPEC_FULL.md` in the
//! repository for the full scope.
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod container;
pub mod error;
pub mod pe;

pub use error::{Error, Result};
pub use pe::{load, Image};
