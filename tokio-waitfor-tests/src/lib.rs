// SPDX-License-Identifier: Apache-2.0 OR MIT

#[cfg(test)]
mod common;
#[cfg(test)]
mod config;
