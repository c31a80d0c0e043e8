mod main_flow_tests;
mod multi_week_tests;
