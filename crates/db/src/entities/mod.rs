//! Database entities.

#![allow(missing_docs)]

pub mod comment;
pub mod following;
pub mod interaction;
pub mod notification;
pub mod notification_preference;
pub mod post;
pub mod post_view;
pub mod user;
pub mod user_activity;

pub use comment::Entity as Comment;
pub use following::Entity as Following;
pub use interaction::Entity as Interaction;
pub use notification::Entity as Notification;
pub use notification_preference::Entity as NotificationPreference;
pub use post::Entity as Post;
pub use post_view::Entity as PostView;
pub use user::Entity as User;
pub use user_activity::Entity as UserActivity;
