mod network_integration;
mod pdm;
mod properties;
mod routing_table;
mod sim_time;
mod simulator;
