pub mod alert;
pub mod alert_send_record;
pub mod alert_silence;
pub mod channel;
pub mod datasource;
pub mod jira_ticket;
pub mod rule;
pub mod system_config;
pub mod template;
