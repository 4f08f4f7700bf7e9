use super::*;
use crate::headers;
use crate::journal::FileJournal;
use chrono::Duration;

mod common;
use common::*;

mod delivery;
mod metrics;
