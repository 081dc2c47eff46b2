pub mod publisher;
pub mod session;
pub mod source;
pub mod subscriber;
pub mod trip;
pub mod view;
