mod command_buffer_states;
mod memory_budget;
