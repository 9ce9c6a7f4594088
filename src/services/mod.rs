pub mod blob_storage;
pub mod gemini;
pub mod image_provider;
pub mod json_repair;
pub mod lesson_images;
pub mod lesson_store;
pub mod lesson_text;
pub mod lesson_transfer;
pub mod pipeline;
pub mod provider;
pub mod retry;
pub mod text_provider;

#[cfg(test)]
pub(crate) mod testing;
