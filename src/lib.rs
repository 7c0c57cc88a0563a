/*
 *  Copyright (C) 2025 Michael Bachmann
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU Affero General Public License for more details.
 *
 *  You should have received a copy of the GNU Affero General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Ancillary-data codec, scatter-gather buffers, RIFF framer, and the
//! AVM↔NDI media bridge core.

pub mod anc;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod convert;
pub mod error;
pub mod fifo;
pub mod frame;
pub mod monitoring;
pub mod pool;
pub mod riff;
pub mod sgl;
pub mod transport;

pub use error::{CdiError, CdiResult, Status};
