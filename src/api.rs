pub mod sems;
