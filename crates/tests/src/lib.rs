//! Black-box HTTP tests: the real router and pipeline on an ephemeral
//! port, with deterministic stand-ins for the external providers and the
//! two ONNX models.

#[cfg(test)]
mod fixtures;

#[cfg(test)]
mod enrollment_tests;
#[cfg(test)]
mod identify_tests;
#[cfg(test)]
mod session_tests;
