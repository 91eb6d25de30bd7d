//! Coordinator behavior tests, one file per concern.

use super::test_helpers::*;
use super::*;
use crate::error::{Error, FetchError, FetchErrorKind, ValidationError};
use crate::types::{DownloadId, Event, Status};
use std::time::Duration;
