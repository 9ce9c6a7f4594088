use std::convert::Infallible;

use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::lesson::flow::{
    check_fill_in_blank, check_matching, highlight_story, reveal_comprehension, shuffled_options,
    AnswerResult, FlowError, LessonFlow, MatchingItem,
};
use crate::lesson::{LessonRecord, WordList, WordListError};
use crate::response::{ok, AppError, ErrorResponse, JsonBody};
use crate::services::lesson_store::{LessonSummary, StoredLesson};
use crate::services::lesson_transfer::{parse_export, share_url, LessonExport};
use crate::services::pipeline::{NoProgress, Progress, ProgressSink};
use crate::state::AppState;

/// Lessons carry inline base64 images until they reach blob storage.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_lessons).post(save_lesson))
        .route("/generate", post(generate))
        .route("/generate/stream", post(generate_stream))
        .route("/import", post(import_lesson))
        .route("/:id", get(get_lesson).delete(delete_lesson))
        .route("/:id/archive", post(archive_lesson))
        .route("/:id/unarchive", post(unarchive_lesson))
        .route("/:id/words/:index/image", put(update_word_image))
        .route("/:id/words/:index/definition", put(update_definition))
        .route("/:id/export", get(export_lesson))
        .route("/:id/share", get(share_lesson))
        .route("/:id/practice", get(practice_view))
        .route("/:id/practice/check", post(check_practice))
        .route("/:id/practice/score", post(score_practice))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

/// Word lists arrive either as the raw textarea text or as an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WordsInput {
    Text(String),
    List(Vec<String>),
}

impl WordsInput {
    fn into_word_list(self) -> Result<WordList, WordListError> {
        match self {
            Self::Text(raw) => WordList::parse(&raw),
            Self::List(words) => WordList::from_words(words),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    words: WordsInput,
    #[serde(default)]
    save: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedLesson {
    lesson_id: String,
    title: String,
    saved: bool,
    lesson: LessonRecord,
}

async fn generate(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<GenerateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let words = payload.words.into_word_list()?;
    let generated = run_generation(&state, &words, payload.save, &NoProgress).await?;
    Ok(ok(generated))
}

async fn run_generation(
    state: &AppState,
    words: &WordList,
    save: bool,
    progress: &dyn ProgressSink,
) -> Result<GeneratedLesson, AppError> {
    let lesson = state.pipeline().build_lesson(words, progress).await?;

    if !save {
        return Ok(GeneratedLesson {
            lesson_id: words.lesson_id(),
            title: words.title(),
            saved: false,
            lesson,
        });
    }

    let stored = state.store().save(words, lesson).await?;
    Ok(GeneratedLesson {
        lesson_id: stored.lesson_id,
        title: stored.title,
        saved: true,
        lesson: stored.lesson,
    })
}

enum GenerationEvent {
    Progress(Progress),
    Complete(GeneratedLesson),
    Error(ErrorResponse),
}

impl GenerationEvent {
    fn into_sse(self) -> Event {
        let (name, data) = match self {
            Self::Progress(p) => ("progress", serde_json::to_string(&p)),
            Self::Complete(lesson) => ("complete", serde_json::to_string(&lesson)),
            Self::Error(err) => ("error", serde_json::to_string(&err)),
        };
        Event::default()
            .id(uuid::Uuid::new_v4().to_string())
            .event(name)
            .data(data.unwrap_or_else(|_| "{}".to_string()))
    }
}

async fn generate_stream(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<GenerateRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let words = payload.words.into_word_list()?;
    let save = payload.save;
    let (tx, rx) = mpsc::unbounded_channel::<GenerationEvent>();

    tokio::spawn(async move {
        let progress_tx = tx.clone();
        let progress = move |p: Progress| {
            let _ = progress_tx.send(GenerationEvent::Progress(p));
        };

        let outcome = tokio::select! {
            result = run_generation(&state, &words, save, &progress) => result,
            _ = tx.closed() => {
                info!(words = %words.title(), "client disconnected, lesson generation abandoned");
                return;
            }
        };

        let event = match outcome {
            Ok(lesson) => GenerationEvent::Complete(lesson),
            Err(err) => GenerationEvent::Error(ErrorResponse {
                success: false,
                error: err.public_message().to_string(),
                code: err.code().to_string(),
            }),
        };
        if tx.send(event).is_err() {
            warn!("generation finished after the client went away");
        }
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| Ok::<Event, Infallible>(event.into_sse()));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    limit: Option<i64>,
    #[serde(default)]
    include_archived: bool,
}

async fn list_lessons(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let lessons: Vec<LessonSummary> = state
        .store()
        .list_recent(query.limit, query.include_archived)
        .await?;
    Ok(ok(lessons))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveRequest {
    words: WordsInput,
    lesson_data: LessonRecord,
}

async fn save_lesson(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<SaveRequest>,
) -> Result<impl IntoResponse, AppError> {
    let words = payload.words.into_word_list()?;
    let stored = state.store().save(&words, payload.lesson_data).await?;
    Ok(ok(stored))
}

async fn get_lesson(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.store().get(&id).await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Deleted {
    lesson_id: String,
    deleted: bool,
}

async fn delete_lesson(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.store().delete(&id).await?;
    Ok(ok(Deleted {
        lesson_id: id,
        deleted: true,
    }))
}

async fn archive_lesson(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.store().archive(&id).await?))
}

async fn unarchive_lesson(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.store().unarchive(&id).await?))
}

#[derive(Debug, Deserialize)]
struct ImageUpdate {
    image: String,
}

async fn update_word_image(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
    JsonBody(payload): JsonBody<ImageUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let stored = state
        .store()
        .update_word_image(&id, index, &payload.image)
        .await?;
    Ok(ok(stored))
}

#[derive(Debug, Deserialize)]
struct DefinitionUpdate {
    definition: String,
}

async fn update_definition(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
    JsonBody(payload): JsonBody<DefinitionUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let stored = state
        .store()
        .update_definition(&id, index, &payload.definition)
        .await?;
    Ok(ok(stored))
}

async fn find_lesson(state: &AppState, id: &str) -> Result<StoredLesson, AppError> {
    state
        .store()
        .find(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("lesson not found: {id}")))
}

async fn export_lesson(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let stored = find_lesson(&state, &id).await?;
    let export = LessonExport::from_stored(&stored);
    let disposition = format!("attachment; filename=\"{}\"", export.file_name(&id));
    Ok(([(header::CONTENT_DISPOSITION, disposition)], Json(export)).into_response())
}

async fn import_lesson(
    State(state): State<AppState>,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    let export = parse_export(&body)?;
    let words = export.word_list()?;
    let stored = state.store().save(&words, export.lesson_data).await?;
    info!(lesson_id = %stored.lesson_id, "lesson imported");
    Ok(ok(stored))
}

#[derive(Serialize)]
struct ShareLink {
    url: String,
}

async fn share_lesson(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let stored = find_lesson(&state, &id).await?;
    let url = share_url(state.config().public_app_url.as_deref(), &stored.lesson_id)?;
    Ok(ok(ShareLink { url }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PracticeQuestion {
    sentence: String,
    options: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PracticeView {
    story_title: String,
    story_html: String,
    fill_in_blank: Vec<PracticeQuestion>,
    comprehension: Vec<String>,
    matching: Vec<MatchingItem>,
}

async fn practice_flow(state: &AppState, id: &str) -> Result<LessonFlow, AppError> {
    let lesson = find_lesson(state, id).await?.lesson;
    let mut flow = LessonFlow::new();
    flow.start(lesson);
    flow.skip_to_practice()?;
    Ok(flow)
}

/// Student-facing practice material with the answers left out.
async fn practice_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let flow = practice_flow(&state, &id).await?;
    let lesson = flow.lesson().ok_or(FlowError::NoLesson)?;
    Ok(ok(PracticeView {
        story_title: lesson.story.title.clone(),
        story_html: highlight_story(lesson),
        fill_in_blank: lesson
            .practice
            .fill_in_blank
            .iter()
            .map(|q| PracticeQuestion {
                sentence: q.sentence.clone(),
                options: shuffled_options(q),
            })
            .collect(),
        comprehension: lesson
            .practice
            .comprehension
            .iter()
            .map(|q| q.question.clone())
            .collect(),
        matching: flow.matching_board().to_vec(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum PracticeAnswer {
    FillInBlank { index: usize, answer: String },
    Comprehension { index: usize },
    Matching { image: String, answer: String },
}

async fn check_practice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<PracticeAnswer>,
) -> Result<impl IntoResponse, AppError> {
    let lesson = find_lesson(&state, &id).await?.lesson;
    let result: AnswerResult = match payload {
        PracticeAnswer::FillInBlank { index, answer } => check_fill_in_blank(&lesson, index, &answer)?,
        PracticeAnswer::Comprehension { index } => reveal_comprehension(&lesson, index)?,
        PracticeAnswer::Matching { image, answer } => check_matching(&lesson, &image, &answer)?,
    };
    Ok(ok(result))
}

#[derive(Debug, Deserialize)]
struct ScoreRequest {
    /// Fill-in-blank answers in question order.
    answers: Vec<String>,
}

#[derive(Serialize)]
struct PracticeScore {
    correct: usize,
    total: usize,
    results: Vec<AnswerResult>,
}

async fn score_practice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<ScoreRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut flow = practice_flow(&state, &id).await?;
    let mut results = Vec::with_capacity(payload.answers.len());
    for (index, answer) in payload.answers.iter().enumerate() {
        results.push(flow.answer_fill_in_blank(index, answer)?.clone());
    }
    let (correct, total) = flow.fill_in_blank_score();
    Ok(ok(PracticeScore {
        correct,
        total,
        results,
    }))
}
