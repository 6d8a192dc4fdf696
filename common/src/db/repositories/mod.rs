// Repository implementations backed by PostgreSQL

pub mod notification;
pub mod task;

pub use notification::NotificationRepository;
pub use task::PgTaskStore;
