use super::test_helpers::*;
use super::*;
use crate::codec::NoOpTranscoder;
use crate::config::PreviewStrategy;
use crate::types::{JobStatus, OutputFormat};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

mod pipeline;
