use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, QueryBuilder};

use crate::audit::{self, AuditEntry};
use crate::error::{conflict_on_unique, AppError, AppResult};
use crate::models::*;
use crate::policy::{GoverningEvent, MemberViewer, Viewer};
use crate::store::OncallStore;

const TEAM_COLUMNS: &str = "id, name, description, email, slack_channel, \
    slack_channel_notifications, override_phone_number, scheduling_timezone, iris_plan, \
    iris_enabled, api_managed_roster, active";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn push_name_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    name_col: &str,
    id_col: &str,
    filter: &NameFilter,
) {
    if let Some(v) = &filter.name_eq {
        qb.push(format!(" AND {name_col} = ")).push_bind(v.clone());
    }
    if let Some(v) = &filter.name_contains {
        qb.push(format!(" AND {name_col} LIKE "))
            .push_bind(format!("%{}%", escape_like(v)));
    }
    if let Some(v) = &filter.name_startswith {
        qb.push(format!(" AND {name_col} LIKE "))
            .push_bind(format!("{}%", escape_like(v)));
    }
    if let Some(v) = &filter.name_endswith {
        qb.push(format!(" AND {name_col} LIKE "))
            .push_bind(format!("%{}", escape_like(v)));
    }
    if let Some(id) = filter.id {
        qb.push(format!(" AND {id_col} = ")).push_bind(id);
    }
}

#[derive(sqlx::FromRow)]
struct MemberRecord {
    roster: String,
    user_id: i64,
    user_name: String,
    in_rotation: bool,
}

#[derive(sqlx::FromRow)]
struct EventRecord {
    user_id: i64,
    display_order: i32,
    start: i64,
    duration: i64,
}

#[async_trait]
impl OncallStore for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    async fn team_by_name(&self, name: &str, active: bool) -> AppResult<Option<Team>> {
        let sql = format!("SELECT {TEAM_COLUMNS} FROM team WHERE name = $1 AND active = $2");
        let team = sqlx::query_as::<_, Team>(&sql)
            .bind(name)
            .bind(active)
            .fetch_optional(&self.pool)
            .await?;
        Ok(team)
    }

    async fn team_names(&self, filter: &NameFilter) -> AppResult<Vec<String>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT name FROM team WHERE active = TRUE");
        push_name_filter(&mut qb, "name", "id", filter);
        qb.push(" ORDER BY name");
        let names = qb
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn create_team(
        &self,
        team: &NewTeam,
        creator: &str,
        audit: &AuditEntry,
    ) -> AppResult<i64> {
        let mut tx = self.pool.begin().await?;

        let team_id: i64 = sqlx::query_scalar(
            r#"INSERT INTO team (name, scheduling_timezone, description, email, slack_channel,
                slack_channel_notifications, override_phone_number, iris_plan, iris_enabled,
                api_managed_roster, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE)
            RETURNING id"#,
        )
        .bind(&team.name)
        .bind(&team.scheduling_timezone)
        .bind(&team.description)
        .bind(&team.email)
        .bind(&team.slack_channel)
        .bind(&team.slack_channel_notifications)
        .bind(&team.override_phone_number)
        .bind(&team.iris_plan)
        .bind(team.iris_enabled)
        .bind(team.api_managed_roster)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || format!("A team named '{}' already exists", team.name))
        })?;

        sqlx::query(r#"INSERT INTO team_admin (team_id, user_id) SELECT $1, id FROM "user" WHERE name = $2"#)
            .bind(team_id)
            .bind(creator)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r#"INSERT INTO team_user (team_id, user_id) SELECT $1, id FROM "user" WHERE name = $2"#)
            .bind(team_id)
            .bind(creator)
            .execute(&mut *tx)
            .await?;

        audit::record(&mut tx, &audit.clone().with("team_id", json!(team_id)), now()).await?;
        tx.commit().await?;
        Ok(team_id)
    }

    async fn update_team(
        &self,
        name: &str,
        patch: &TeamPatch,
        audit: &AuditEntry,
    ) -> AppResult<()> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE team SET ");
        {
            let mut set = qb.separated(", ");
            if let Some(v) = &patch.name {
                set.push("name = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &patch.description {
                set.push("description = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &patch.slack_channel {
                set.push("slack_channel = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &patch.slack_channel_notifications {
                set.push("slack_channel_notifications = ")
                    .push_bind_unseparated(v.clone());
            }
            if let Some(v) = &patch.email {
                set.push("email = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &patch.scheduling_timezone {
                set.push("scheduling_timezone = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &patch.iris_plan {
                set.push("iris_plan = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = patch.iris_enabled {
                set.push("iris_enabled = ").push_bind_unseparated(v);
            }
            if let Some(v) = &patch.override_phone_number {
                set.push("override_phone_number = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = patch.api_managed_roster {
                set.push("api_managed_roster = ").push_bind_unseparated(v);
            }
        }
        qb.push(" WHERE active = TRUE AND name = ")
            .push_bind(name.to_string());

        let mut tx = self.pool.begin().await?;
        let result = qb.build().execute(&mut *tx).await.map_err(|e| {
            conflict_on_unique(e, || {
                format!(
                    "A team named '{}' already exists",
                    patch.name.as_deref().unwrap_or(name)
                )
            })
        })?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("team \"{name}\" not found")));
        }

        audit::record(&mut tx, audit, now()).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_team(
        &self,
        name: &str,
        new_name: &str,
        now: i64,
        audit: &AuditEntry,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let team_id: Option<i64> = sqlx::query_scalar(
            "UPDATE team SET active = FALSE WHERE name = $1 AND active = TRUE RETURNING id",
        )
        .bind(name)
        .fetch_optional(&mut *tx)
        .await?;
        let team_id =
            team_id.ok_or_else(|| AppError::NotFound(format!("team \"{name}\" not found")))?;

        let removed = sqlx::query("DELETE FROM event WHERE team_id = $1 AND start > $2")
            .bind(team_id)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        audit::record(&mut tx, audit, now).await?;

        // Free the name for reuse; deleted_team keeps the mapping.
        sqlx::query("UPDATE team SET name = $1 WHERE id = $2")
            .bind(new_name)
            .bind(team_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO deleted_team (team_id, new_name, old_name, deletion_date) VALUES ($1, $2, $3, $4)",
        )
        .bind(team_id)
        .bind(new_name)
        .bind(name)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(team = %name, renamed_to = %new_name, removed_events = removed, "team deleted");
        Ok(())
    }

    async fn team_user_names(&self, team_id: i64) -> AppResult<Vec<String>> {
        let names = sqlx::query_scalar(
            r#"SELECT u.name FROM team_user tu JOIN "user" u ON u.id = tu.user_id
            WHERE tu.team_id = $1 ORDER BY u.name"#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn team_admin_names(&self, team_id: i64) -> AppResult<Vec<String>> {
        let names = sqlx::query_scalar(
            r#"SELECT u.name FROM team_admin ta JOIN "user" u ON u.id = ta.user_id
            WHERE ta.team_id = $1 ORDER BY u.name"#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn team_service_names(&self, team_id: i64) -> AppResult<Vec<String>> {
        let names = sqlx::query_scalar(
            r#"SELECT s.name FROM team_service ts JOIN service s ON s.id = ts.service_id
            WHERE ts.team_id = $1 ORDER BY s.name"#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn is_team_admin(&self, team: &str, user: &str) -> AppResult<bool> {
        let allowed: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(
                SELECT 1 FROM "user" u
                WHERE u.name = $2 AND (
                    u.god
                    OR EXISTS(
                        SELECT 1 FROM team_admin ta JOIN team t ON t.id = ta.team_id
                        WHERE ta.user_id = u.id AND t.name = $1 AND t.active = TRUE
                    )
                )
            )"#,
        )
        .bind(team)
        .bind(user)
        .fetch_one(&self.pool)
        .await?;
        Ok(allowed)
    }

    async fn rosters(&self, team_id: i64, filter: &NameFilter) -> AppResult<Vec<Roster>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id, name FROM roster WHERE team_id = ");
        qb.push_bind(team_id);
        push_name_filter(&mut qb, "name", "id", filter);
        qb.push(" ORDER BY name");
        let rosters = qb.build_query_as::<Roster>().fetch_all(&self.pool).await?;
        Ok(rosters)
    }

    async fn roster_members(
        &self,
        team_id: i64,
        filter: &NameFilter,
    ) -> AppResult<Vec<MembershipRow>> {
        let mut qb = QueryBuilder::<Postgres>::new(
            r#"SELECT ro.name AS roster, u.id AS user_id, u.name AS user_name, ru.in_rotation
            FROM roster_user ru
            JOIN roster ro ON ro.id = ru.roster_id
            JOIN "user" u ON u.id = ru.user_id
            WHERE ro.team_id = "#,
        );
        qb.push_bind(team_id);
        push_name_filter(&mut qb, "ro.name", "ro.id", filter);
        qb.push(" ORDER BY ro.name, u.name");
        let members = qb
            .build_query_as::<MemberRecord>()
            .fetch_all(&self.pool)
            .await?;

        let mut user_ids: Vec<i64> = members.iter().map(|m| m.user_id).collect();
        user_ids.sort_unstable();
        user_ids.dedup();

        let events: Vec<EventRecord> = sqlx::query_as(
            r#"SELECT DISTINCT e.user_id, r.display_order, e.start, e."end" - e.start AS duration
            FROM event e JOIN role r ON r.id = e.role_id
            WHERE e.team_id = $1 AND e.user_id = ANY($2)"#,
        )
        .bind(team_id)
        .bind(&user_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_user: HashMap<i64, Vec<GoverningEvent>> = HashMap::new();
        for e in events {
            by_user.entry(e.user_id).or_default().push(GoverningEvent {
                display_order: e.display_order,
                start: e.start,
                duration: e.duration,
            });
        }

        Ok(members
            .into_iter()
            .map(|m| MembershipRow {
                events: by_user.get(&m.user_id).cloned().unwrap_or_default(),
                roster: m.roster,
                user_id: m.user_id,
                user: m.user_name,
                in_rotation: m.in_rotation,
            })
            .collect())
    }

    async fn create_roster(&self, team: &str, name: &str, audit: &AuditEntry) -> AppResult<i64> {
        let mut tx = self.pool.begin().await?;

        let team_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM team WHERE name = $1 AND active = TRUE")
                .bind(team)
                .fetch_optional(&mut *tx)
                .await?;
        let team_id =
            team_id.ok_or_else(|| AppError::NotFound(format!("team \"{team}\" not found")))?;

        let roster_id: i64 =
            sqlx::query_scalar("INSERT INTO roster (name, team_id) VALUES ($1, $2) RETURNING id")
                .bind(name)
                .bind(team_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    conflict_on_unique(e, || {
                        format!("roster name \"{name}\" already exists for team {team}")
                    })
                })?;

        audit::record(&mut tx, &audit.clone().with("roster_id", json!(roster_id)), now()).await?;
        tx.commit().await?;
        Ok(roster_id)
    }

    async fn viewer(&self, user: Option<&str>, team_id: i64) -> AppResult<Viewer> {
        let Some(name) = user else {
            return Ok(Viewer::Anonymous);
        };

        let row: Option<(i64, String, bool)> =
            sqlx::query_as(r#"SELECT id, name, god FROM "user" WHERE name = $1"#)
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        let Some((user_id, name, god)) = row else {
            return Ok(Viewer::Anonymous);
        };

        let team_admin: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM team_admin WHERE team_id = $1 AND user_id = $2)",
        )
        .bind(team_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let assignment_ranks: Vec<i32> = sqlx::query_scalar(
            r#"SELECT DISTINCT r.display_order
            FROM roster_user ru
            JOIN schedule s ON s.roster_id = ru.roster_id
            JOIN role r ON r.id = s.role_id
            WHERE ru.user_id = $1 AND s.team_id = $2
            ORDER BY r.display_order"#,
        )
        .bind(user_id)
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Viewer::Member(MemberViewer {
            user_id,
            name,
            god,
            team_admin,
            assignment_ranks,
        }))
    }

    async fn schedules(&self, team_id: i64) -> AppResult<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> = sqlx::query_as(
            r#"SELECT s.id, r.name AS role, s.role_id, ro.name AS roster, s.roster_id,
                t.name AS team, s.team_id, t.scheduling_timezone AS timezone,
                s.advanced_mode, s.auto_populate_threshold
            FROM schedule s
            JOIN role r ON r.id = s.role_id
            JOIN roster ro ON ro.id = s.roster_id
            JOIN team t ON t.id = s.team_id
            WHERE s.team_id = $1
            ORDER BY s.id"#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<i64> = schedules.iter().map(|s| s.id).collect();
        let events: Vec<(i64, i64, i64)> = sqlx::query_as(
            "SELECT schedule_id, start, duration FROM schedule_event WHERE schedule_id = ANY($1) ORDER BY start",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_schedule: HashMap<i64, Vec<ScheduleEvent>> = HashMap::new();
        for (schedule_id, start, duration) in events {
            by_schedule
                .entry(schedule_id)
                .or_default()
                .push(ScheduleEvent { start, duration });
        }
        for s in &mut schedules {
            s.events = by_schedule.remove(&s.id).unwrap_or_default();
        }
        Ok(schedules)
    }

    async fn users(&self, filter: &UserFilter) -> AppResult<Vec<UserProfile>> {
        let mut qb = QueryBuilder::<Postgres>::new(
            r#"SELECT id, name, full_name, time_zone, photo_url, active, god FROM "user" WHERE TRUE"#,
        );
        if let Some(id) = filter.id {
            qb.push(" AND id = ").push_bind(id);
        }
        if let Some(names) = &filter.names {
            qb.push(" AND name = ANY(").push_bind(names.clone()).push(")");
        }
        qb.push(" ORDER BY name");
        let mut users = qb
            .build_query_as::<UserProfile>()
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<i64> = users.iter().map(|u| u.id).collect();
        let contacts: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT user_id, mode, destination FROM user_contact WHERE user_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        for (user_id, mode, destination) in contacts {
            if let Some(user) = users.iter_mut().find(|u| u.id == user_id) {
                user.contacts.insert(mode, destination);
            }
        }
        Ok(users)
    }

    async fn password_hash(&self, user: &str) -> AppResult<Option<String>> {
        let hash: Option<Option<String>> =
            sqlx::query_scalar(r#"SELECT password_hash FROM "user" WHERE name = $1"#)
                .bind(user)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hash.flatten())
    }

    async fn upsert_directory_user(
        &self,
        user: &str,
        profile: &DirectoryProfile,
    ) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        let (user_id, created): (i64, bool) = sqlx::query_as(
            r#"INSERT INTO "user" (name, full_name) VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET full_name = COALESCE(EXCLUDED.full_name, "user".full_name)
            RETURNING id, (xmax = 0) AS created"#,
        )
        .bind(user)
        .bind(&profile.full_name)
        .fetch_one(&mut *tx)
        .await?;

        for (mode, destination) in &profile.contacts {
            sqlx::query(
                r#"INSERT INTO user_contact (user_id, mode, destination) VALUES ($1, $2, $3)
                ON CONFLICT (user_id, mode) DO UPDATE SET destination = EXCLUDED.destination"#,
            )
            .bind(user_id)
            .bind(mode)
            .bind(destination)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn create_session(&self, session: &Session) -> AppResult<()> {
        sqlx::query("INSERT INTO session (id, user_name, csrf_token) VALUES ($1, $2, $3)")
            .bind(&session.id)
            .bind(&session.user_name)
            .bind(&session.csrf_token)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, || "User already logged in".to_string()))?;
        Ok(())
    }

    async fn session(&self, id: &str) -> AppResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT id, user_name, csrf_token FROM session WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn delete_session(&self, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM session WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
