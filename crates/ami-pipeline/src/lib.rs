//! ami-pipeline - golden image promotion and EKS node group patching
//!
//! This crate provides the two pipelines behind the `ami-pipeline` binary:
//! promoting an instance into a shared, discoverable golden image, and
//! rolling managed node groups onto the image published for their cluster.

pub mod aws;
pub mod config;
pub mod nodes;
pub mod patch;
pub mod promote;
pub mod wait;
pub mod watch;

#[cfg(test)]
mod testing;
