//! Pipeline tests against in-process collaborators.

mod support;
