//! Provision and control virtual machines on a libvirt endpoint.
//!
//! The library drives libvirt through the `virsh` binary with structured
//! argument lists. [`connection::Connection`] holds the endpoint handle;
//! [`descriptor`] builds deterministic domain, pool and volume XML;
//! [`pool`], [`vm`] and [`upload`] implement storage, lifecycle and ISO
//! transfer on top. All failures surface through the typed
//! [`error::Error`] taxonomy and nothing is retried internally.

pub mod cli;
pub mod config;
pub mod connection;
pub mod descriptor;
pub mod error;
pub mod pool;
pub mod upload;
pub mod vm;
pub mod xml_utils;
