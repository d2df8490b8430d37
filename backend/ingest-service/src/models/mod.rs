mod event;
mod pagination;

pub use event::Event;
pub use pagination::{Page, PageRequest, PaginatedEvents, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
