//! Data models for campus portal resources.
//!
//! - `News`, `Event`: campus announcements and calendar
//! - `ScheduleEntry`, `Course`, `Grade`: academic records
//! - `UserProfile`, `NewUser`, `UserUpdate`: accounts and admin user management
//!
//! With the `ts` feature enabled these also derive TypeScript bindings for
//! the mobile front end.

pub mod academic;
pub mod news;
pub mod user;

pub use academic::{Course, Grade, GradeKind, LessonType, ScheduleEntry};
pub use news::{Event, EventCategory, News, NewsCategory};
pub use user::{NewUser, Role, UserProfile, UserUpdate};
