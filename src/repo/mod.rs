pub mod event;
pub mod notification;

pub struct DatabasePagination {
    pub limit: i64,
    pub offset: i64,
}
