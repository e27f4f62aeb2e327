mod support;
mod test_orchestrator;
