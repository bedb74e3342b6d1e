#[macro_use]
mod support;

mod data_source_planners;
mod entities;
mod errors;
mod fragments;
mod root_fields;
