pub mod mem_change_listener;
pub mod mem_unit_of_work;
