//! Paginated todo queries built from optional filters.
//!
//! Every filter either contributes one SQL predicate or nothing at all. The
//! present predicates are joined with `AND`, so a request with every filter
//! left blank reads as an unfiltered listing. The same predicate set drives
//! both the page query and the total-count query, which keeps `total_elements`
//! independent of `LIMIT`/`OFFSET`.

use rusqlite::{Connection, Row, ToSql};
use serde::{Deserialize, Serialize};
use time::macros::{format_description, time};
use time::{Date, PrimitiveDateTime};

use crate::db::{self, DbPool, TODO_RESPONSE_COLUMNS};
use crate::error::AppError;
use crate::models::TodoResponse;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Zero-based page index plus page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub index: u32,
    pub size: u32,
}

impl PageRequest {
    /// Builds a request from the 1-based page number clients send.
    pub fn from_page_number(page: u32, size: u32) -> Result<Self, AppError> {
        if page == 0 {
            return Err(AppError::bad_request("page must be at least 1"));
        }
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(AppError::BadRequest(format!(
                "size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(Self {
            index: page - 1,
            size,
        })
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.index) * i64::from(self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total_elements: i64) -> Self {
        let size = i64::from(request.size);
        Self {
            items,
            page: request.index + 1,
            size: request.size,
            total_elements,
            total_pages: (total_elements + size - 1) / size,
        }
    }
}

/// One search hit: the todo title with its manager and comment counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultRow {
    pub title: String,
    pub manager_count: i64,
    pub comment_count: i64,
}

/// Query-string shape of `GET /api/todos/search`.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub title: Option<String>,
    pub nickname: Option<String>,
    pub created_at_start: Option<String>,
    pub created_at_end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    title: Option<String>,
    nickname: Option<String>,
    start: Option<PrimitiveDateTime>,
    end: Option<PrimitiveDateTime>,
    page: PageRequest,
}

impl SearchFilter {
    /// Blank strings are dropped here so they never reach the query as `contains("")`.
    pub fn new(
        title: Option<String>,
        nickname: Option<String>,
        start: Option<PrimitiveDateTime>,
        end: Option<PrimitiveDateTime>,
        page: PageRequest,
    ) -> Self {
        Self {
            title: non_blank(title),
            nickname: non_blank(nickname),
            start,
            end,
            page,
        }
    }

    pub fn page(&self) -> PageRequest {
        self.page
    }

    fn conditions(&self) -> Conditions {
        Conditions::all([
            self.title
                .clone()
                .map(|t| Predicate::Contains("t.title", t)),
            self.nickname
                .clone()
                .map(|n| Predicate::Contains("u.nickname", n)),
            self.start.map(|s| Predicate::AtLeast("t.created_at", s)),
            self.end.map(|e| Predicate::AtMost("t.created_at", e)),
        ])
    }
}

impl TryFrom<SearchQuery> for SearchFilter {
    type Error = AppError;

    fn try_from(query: SearchQuery) -> Result<Self, Self::Error> {
        let page = PageRequest::from_page_number(
            query.page.unwrap_or(1),
            query.size.unwrap_or(DEFAULT_PAGE_SIZE),
        )?;
        Ok(SearchFilter::new(
            query.title,
            query.nickname,
            parse_start_of_day(query.created_at_start.as_deref())?,
            parse_end_of_day(query.created_at_end.as_deref())?,
            page,
        ))
    }
}

/// Query-string shape of `GET /api/todos`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub weather: Option<String>,
    pub modified_start: Option<String>,
    pub modified_end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherFilter {
    weather: Option<String>,
    start: Option<PrimitiveDateTime>,
    end: Option<PrimitiveDateTime>,
    page: PageRequest,
}

impl WeatherFilter {
    pub fn new(
        weather: Option<String>,
        start: Option<PrimitiveDateTime>,
        end: Option<PrimitiveDateTime>,
        page: PageRequest,
    ) -> Self {
        Self {
            weather: non_blank(weather),
            start,
            end,
            page,
        }
    }

    fn conditions(&self) -> Conditions {
        Conditions::all([
            self.weather
                .clone()
                .map(|w| Predicate::Contains("t.weather", w)),
            self.start.map(|s| Predicate::AtLeast("t.modified_at", s)),
            self.end.map(|e| Predicate::AtMost("t.modified_at", e)),
        ])
    }
}

impl TryFrom<ListQuery> for WeatherFilter {
    type Error = AppError;

    fn try_from(query: ListQuery) -> Result<Self, Self::Error> {
        let page = PageRequest::from_page_number(
            query.page.unwrap_or(1),
            query.size.unwrap_or(DEFAULT_PAGE_SIZE),
        )?;
        Ok(WeatherFilter::new(
            query.weather,
            parse_start_of_day(query.modified_start.as_deref())?,
            parse_end_of_day(query.modified_end.as_deref())?,
            page,
        ))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Expands `YYYY-MM-DD` to the first second of that day.
pub fn parse_start_of_day(input: Option<&str>) -> Result<Option<PrimitiveDateTime>, AppError> {
    parse_day(input).map(|day| day.map(|d| PrimitiveDateTime::new(d, time!(0:00))))
}

/// Expands `YYYY-MM-DD` to `23:59:59` of that day.
pub fn parse_end_of_day(input: Option<&str>) -> Result<Option<PrimitiveDateTime>, AppError> {
    parse_day(input).map(|day| day.map(|d| PrimitiveDateTime::new(d, time!(23:59:59))))
}

fn parse_day(input: Option<&str>) -> Result<Option<Date>, AppError> {
    let Some(raw) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map(Some)
        .map_err(|_| AppError::BadRequest(format!("Invalid date '{raw}', expected YYYY-MM-DD")))
}

enum Predicate {
    /// Case-sensitive substring match.
    Contains(&'static str, String),
    AtLeast(&'static str, PrimitiveDateTime),
    AtMost(&'static str, PrimitiveDateTime),
}

impl Predicate {
    fn into_sql(self) -> (String, Box<dyn ToSql>) {
        match self {
            // instr() instead of LIKE: LIKE folds ASCII case and treats % and _ as wildcards.
            Predicate::Contains(column, needle) => {
                (format!("instr({column}, ?) > 0"), Box::new(needle))
            }
            Predicate::AtLeast(column, bound) => (
                format!("{column} >= ?"),
                Box::new(db::to_micros(bound.assume_utc())),
            ),
            Predicate::AtMost(column, bound) => (
                format!("{column} <= ?"),
                Box::new(db::to_micros(bound.assume_utc())),
            ),
        }
    }
}

/// The predicates that survived filtering, ready to be spliced into SQL.
struct Conditions {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl Conditions {
    fn all(predicates: impl IntoIterator<Item = Option<Predicate>>) -> Self {
        let (clauses, params) = predicates
            .into_iter()
            .flatten()
            .map(Predicate::into_sql)
            .unzip();
        Self { clauses, params }
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

const SEARCH_FROM: &str = "todos t INNER JOIN users u ON u.id = t.user_id";

const SEARCH_COLUMNS: &str = "t.title,
    (SELECT COUNT(*) FROM managers m WHERE m.todo_id = t.id),
    (SELECT COUNT(*) FROM comments c WHERE c.todo_id = t.id)";

fn search_row(row: &Row<'_>) -> rusqlite::Result<SearchResultRow> {
    Ok(SearchResultRow {
        title: row.get(0)?,
        manager_count: row.get(1)?,
        comment_count: row.get(2)?,
    })
}

/// Todos matching `filter`, newest first, with manager and comment counts.
pub fn search_todos(pool: &DbPool, filter: &SearchFilter) -> Result<Page<SearchResultRow>, AppError> {
    let conn = db::lock(pool)?;
    fetch_page(
        &conn,
        SEARCH_COLUMNS,
        SEARCH_FROM,
        "t.created_at DESC, t.id DESC",
        &filter.conditions(),
        filter.page,
        search_row,
    )
}

/// Full todos matching `filter`, most recently modified first.
pub fn list_todos(pool: &DbPool, filter: &WeatherFilter) -> Result<Page<TodoResponse>, AppError> {
    let conn = db::lock(pool)?;
    fetch_page(
        &conn,
        TODO_RESPONSE_COLUMNS,
        SEARCH_FROM,
        "t.modified_at DESC, t.id DESC",
        &filter.conditions(),
        filter.page,
        db::todo_response_from_row,
    )
}

fn fetch_page<T, F>(
    conn: &Connection,
    columns: &str,
    from: &str,
    order_by: &str,
    conditions: &Conditions,
    page: PageRequest,
    map: F,
) -> Result<Page<T>, AppError>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let where_sql = conditions.where_sql();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {from}{where_sql}"),
        conditions.params().as_slice(),
        |row| row.get(0),
    )?;

    let limit = i64::from(page.size);
    let offset = page.offset();
    let mut params = conditions.params();
    params.push(&limit);
    params.push(&offset);

    let sql =
        format!("SELECT {columns} FROM {from}{where_sql} ORDER BY {order_by} LIMIT ? OFFSET ?");
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(params.as_slice(), map)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(items, page, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewUser, Todo, User, UserRole};
    use time::macros::datetime;
    use time::OffsetDateTime;

    fn user(pool: &DbPool, email: &str, nickname: &str) -> User {
        db::create_user(
            pool,
            &NewUser {
                email: email.to_string(),
                password_hash: "hash".to_string(),
                role: UserRole::User,
                nickname: nickname.to_string(),
            },
        )
        .unwrap()
    }

    fn todo(pool: &DbPool, owner: &User, title: &str, at: OffsetDateTime) -> Todo {
        db::create_todo(pool, owner.id, title, "contents", "Sunny", at).unwrap()
    }

    fn page(page: u32, size: u32) -> PageRequest {
        PageRequest::from_page_number(page, size).unwrap()
    }

    fn unfiltered(request: PageRequest) -> SearchFilter {
        SearchFilter::new(None, None, None, None, request)
    }

    fn titles(page: &Page<SearchResultRow>) -> Vec<&str> {
        page.items.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn blank_filters_list_everything_newest_first() {
        let pool = db::open_in_memory().unwrap();
        let alice = user(&pool, "alice@test.com", "alice");
        let first = todo(&pool, &alice, "first", datetime!(2024-01-01 09:00 UTC));
        todo(&pool, &alice, "second", datetime!(2024-01-02 09:00 UTC));
        todo(&pool, &alice, "third", datetime!(2024-01-03 09:00 UTC));
        db::create_comment(&pool, first.id, alice.id, "hi").unwrap();

        let filter = SearchFilter::new(
            Some("  ".to_string()),
            Some(String::new()),
            None,
            None,
            page(1, 10),
        );
        assert_eq!(filter, unfiltered(page(1, 10)));

        let result = search_todos(&pool, &filter).unwrap();
        assert_eq!(titles(&result), vec!["third", "second", "first"]);
        assert_eq!(result.total_elements, 3);
        assert_eq!(result.total_pages, 1);
        assert_eq!(
            result.items[2],
            SearchResultRow {
                title: "first".to_string(),
                manager_count: 1,
                comment_count: 1,
            }
        );
    }

    #[test]
    fn title_filter_is_a_case_sensitive_substring() {
        let pool = db::open_in_memory().unwrap();
        let alice = user(&pool, "alice@test.com", "alice");
        todo(&pool, &alice, "xabcx", datetime!(2024-01-01 09:00 UTC));
        todo(&pool, &alice, "ABC upper", datetime!(2024-01-02 09:00 UTC));
        todo(&pool, &alice, "a_bc", datetime!(2024-01-03 09:00 UTC));
        todo(&pool, &alice, "abc", datetime!(2024-01-04 09:00 UTC));

        let filter = SearchFilter::new(Some("abc".to_string()), None, None, None, page(1, 10));
        let result = search_todos(&pool, &filter).unwrap();
        assert_eq!(titles(&result), vec!["abc", "xabcx"]);
        assert_eq!(result.total_elements, 2);
    }

    #[test]
    fn nickname_filter_matches_the_owner_not_the_title() {
        let pool = db::open_in_memory().unwrap();
        let alice = user(&pool, "alice@test.com", "RedSmithAlice");
        let bob = user(&pool, "bob@test.com", "BlueJonesBob");
        todo(&pool, &alice, "groceries", datetime!(2024-01-01 09:00 UTC));
        todo(&pool, &bob, "Smith visit", datetime!(2024-01-02 09:00 UTC));

        let filter = SearchFilter::new(None, Some("Smith".to_string()), None, None, page(1, 10));
        let result = search_todos(&pool, &filter).unwrap();
        assert_eq!(titles(&result), vec!["groceries"]);
    }

    #[test]
    fn start_bound_is_inclusive_to_the_microsecond() {
        let pool = db::open_in_memory().unwrap();
        let alice = user(&pool, "alice@test.com", "alice");
        todo(&pool, &alice, "too early", datetime!(2023-12-31 23:59:59.999999 UTC));
        todo(&pool, &alice, "on the boundary", datetime!(2024-01-01 00:00:00 UTC));

        let start = parse_start_of_day(Some("2024-01-01")).unwrap();
        let filter = SearchFilter::new(None, None, start, None, page(1, 10));
        let result = search_todos(&pool, &filter).unwrap();
        assert_eq!(titles(&result), vec!["on the boundary"]);
    }

    #[test]
    fn end_bound_covers_the_whole_day() {
        let pool = db::open_in_memory().unwrap();
        let alice = user(&pool, "alice@test.com", "alice");
        todo(&pool, &alice, "last second", datetime!(2024-01-31 23:59:59 UTC));
        todo(&pool, &alice, "next day", datetime!(2024-02-01 00:00:00 UTC));

        let end = parse_end_of_day(Some("2024-01-31")).unwrap();
        let filter = SearchFilter::new(None, None, None, end, page(1, 10));
        let result = search_todos(&pool, &filter).unwrap();
        assert_eq!(titles(&result), vec!["last second"]);
    }

    #[test]
    fn total_ignores_pagination_past_the_last_page() {
        let pool = db::open_in_memory().unwrap();
        let alice = user(&pool, "alice@test.com", "alice");
        for day in 1..=5u8 {
            let at = datetime!(2024-01-01 00:00 UTC).replace_day(day).unwrap();
            todo(&pool, &alice, &format!("todo {day}"), at);
        }

        let second = search_todos(&pool, &unfiltered(page(2, 2))).unwrap();
        assert_eq!(titles(&second), vec!["todo 3", "todo 2"]);
        assert_eq!(second.total_elements, 5);
        assert_eq!(second.total_pages, 3);

        let beyond = search_todos(&pool, &unfiltered(page(9, 2))).unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_elements, 5);
        assert_eq!(beyond.page, 9);
    }

    #[test]
    fn counts_are_zero_when_nothing_references_the_todo() {
        let pool = db::open_in_memory().unwrap();
        let alice = user(&pool, "alice@test.com", "alice");
        let lonely = todo(&pool, &alice, "lonely", datetime!(2024-01-01 09:00 UTC));
        let owner_manager = db::list_managers(&pool, lonely.id).unwrap()[0].id;
        assert!(db::delete_manager(&pool, lonely.id, owner_manager).unwrap());
        for text in ["one", "two", "three"] {
            db::create_comment(&pool, lonely.id, alice.id, text).unwrap();
        }

        let result = search_todos(&pool, &unfiltered(page(1, 10))).unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].manager_count, 0);
        assert_eq!(result.items[0].comment_count, 3);
    }

    #[test]
    fn combined_filters_select_a_single_trip() {
        let pool = db::open_in_memory().unwrap();
        let alice = user(&pool, "alice@test.com", "alice");
        let bob = user(&pool, "bob@test.com", "bob");
        let trip = todo(&pool, &alice, "Summer trip", datetime!(2024-01-15 10:00 UTC));
        todo(&pool, &alice, "Winter trip", datetime!(2024-02-15 10:00 UTC));
        todo(&pool, &alice, "Summer camp", datetime!(2024-01-16 10:00 UTC));
        db::add_manager(&pool, trip.id, bob.id).unwrap();
        db::create_comment(&pool, trip.id, bob.id, "count me in").unwrap();

        let filter = SearchFilter::try_from(SearchQuery {
            page: Some(1),
            size: Some(10),
            title: Some("trip".to_string()),
            nickname: None,
            created_at_start: Some("2024-01-01".to_string()),
            created_at_end: Some("2024-01-31".to_string()),
        })
        .unwrap();

        let result = search_todos(&pool, &filter).unwrap();
        assert_eq!(
            result.items,
            vec![SearchResultRow {
                title: "Summer trip".to_string(),
                manager_count: 2,
                comment_count: 1,
            }]
        );
        assert_eq!(result.total_elements, 1);
        assert_eq!(result.total_pages, 1);
    }

    #[test]
    fn no_matches_is_an_empty_page() {
        let pool = db::open_in_memory().unwrap();
        let filter = SearchFilter::new(Some("nothing".to_string()), None, None, None, page(1, 10));
        let result = search_todos(&pool, &filter).unwrap();
        assert!(result.items.is_empty());
        assert_eq!(result.total_elements, 0);
        assert_eq!(result.total_pages, 0);
    }

    #[test]
    fn absent_predicates_are_elided_from_sql() {
        let filter = unfiltered(page(1, 10));
        let conditions = filter.conditions();
        assert_eq!(conditions.where_sql(), "");
        assert!(conditions.params().is_empty());

        let filter = SearchFilter::new(
            Some("a".to_string()),
            None,
            None,
            parse_end_of_day(Some("2024-01-01")).unwrap(),
            page(1, 10),
        );
        let conditions = filter.conditions();
        assert_eq!(
            conditions.where_sql(),
            " WHERE instr(t.title, ?) > 0 AND t.created_at <= ?"
        );
        assert_eq!(conditions.params().len(), 2);
    }

    #[test]
    fn dates_expand_to_full_day_bounds() {
        assert_eq!(
            parse_start_of_day(Some("2024-01-31")).unwrap(),
            Some(datetime!(2024-01-31 00:00:00))
        );
        assert_eq!(
            parse_end_of_day(Some(" 2024-01-31 ")).unwrap(),
            Some(datetime!(2024-01-31 23:59:59))
        );
        assert_eq!(parse_start_of_day(Some("   ")).unwrap(), None);
        assert_eq!(parse_end_of_day(None).unwrap(), None);
    }

    #[test]
    fn malformed_dates_are_client_errors() {
        for input in ["2024-13-01", "01/02/2024", "2024-01-01T00:00:00", "yesterday"] {
            let err = parse_start_of_day(Some(input)).unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{input}");
        }
    }

    #[test]
    fn page_requests_are_validated() {
        assert!(PageRequest::from_page_number(0, 10).is_err());
        assert!(PageRequest::from_page_number(1, 0).is_err());
        assert!(PageRequest::from_page_number(1, MAX_PAGE_SIZE + 1).is_err());
        assert_eq!(page(3, 20).offset(), 40);
    }

    #[test]
    fn weather_listing_filters_and_orders_by_modification() {
        let pool = db::open_in_memory().unwrap();
        let alice = user(&pool, "alice@test.com", "alice");
        db::create_todo(
            &pool,
            alice.id,
            "sunny walk",
            "c",
            "Sunny",
            datetime!(2024-05-01 08:00 UTC),
        )
        .unwrap();
        db::create_todo(
            &pool,
            alice.id,
            "rainy read",
            "c",
            "Rain",
            datetime!(2024-05-02 08:00 UTC),
        )
        .unwrap();
        db::create_todo(
            &pool,
            alice.id,
            "sunny swim",
            "c",
            "Mostly Sunny",
            datetime!(2024-05-03 08:00 UTC),
        )
        .unwrap();

        let filter = WeatherFilter::try_from(ListQuery {
            weather: Some("Sunny".to_string()),
            modified_end: Some("2024-05-03".to_string()),
            ..ListQuery::default()
        })
        .unwrap();
        let result = list_todos(&pool, &filter).unwrap();
        let titles: Vec<&str> = result.items.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["sunny swim", "sunny walk"]);
        assert_eq!(result.items[0].user.email, "alice@test.com");
        assert_eq!(result.total_elements, 2);
    }
}
