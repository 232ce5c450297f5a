pub mod document;
pub mod person;
pub mod project;
pub mod user;

pub use document::Document;
pub use person::Person;
pub use project::Project;
pub use user::User;
