//! Test suites for the host bootstrap and serving loop.

mod support;
