//! Types shared between the grader service and its clients.

pub mod live;
pub mod report;
pub mod rest;
