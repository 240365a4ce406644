// Well-known JSON-RPC method names for the A2A surface.

pub const MESSAGE_SEND: &str = "message/send";
pub const MESSAGE_STREAM: &str = "message/stream";

pub const TASKS_GET: &str = "tasks/get";
pub const TASKS_LIST: &str = "tasks/list";
pub const TASKS_CANCEL: &str = "tasks/cancel";

pub const PUSH_NOTIFICATION_CONFIG_SET: &str = "tasks/pushNotificationConfig/set";
pub const PUSH_NOTIFICATION_CONFIG_GET: &str = "tasks/pushNotificationConfig/get";
pub const PUSH_NOTIFICATION_CONFIG_LIST: &str = "tasks/pushNotificationConfig/list";
pub const PUSH_NOTIFICATION_CONFIG_DELETE: &str = "tasks/pushNotificationConfig/delete";

pub const AGENT_GET_AUTHENTICATED_EXTENDED_CARD: &str = "agent/getAuthenticatedExtendedCard";
