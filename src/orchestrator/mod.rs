//! Periodic orchestration: a single background driver fires three job
//! classes on market-local (America/New_York) cron-like recurrences.
//!
//! Each job class runs single-flight: a fire while the previous run is
//! still in flight is a no-op. Job failures log, mark the class Failed,
//! and never disturb other classes or future fires.

pub mod jobs;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::America::New_York;
use chrono_tz::Tz;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::context::AppContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobClass {
    SentimentRefresh,
    ModelRetrain,
    TradeCycle,
}

impl JobClass {
    pub fn name(&self) -> &'static str {
        match self {
            JobClass::SentimentRefresh => "sentiment-refresh",
            JobClass::ModelRetrain => "model-retrain",
            JobClass::TradeCycle => "trade-cycle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Cron-like recurrence at a fixed local hour.
#[derive(Debug, Clone, Copy)]
pub enum Recurrence {
    Daily { hour: u32 },
    Weekdays { hour: u32 },
    Weekly { weekday: Weekday, hour: u32 },
}

impl Recurrence {
    fn hour(&self) -> u32 {
        match self {
            Recurrence::Daily { hour }
            | Recurrence::Weekdays { hour }
            | Recurrence::Weekly { hour, .. } => *hour,
        }
    }

    fn matches_day(&self, date: NaiveDate) -> bool {
        match self {
            Recurrence::Daily { .. } => true,
            Recurrence::Weekdays { .. } => !matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            Recurrence::Weekly { weekday, .. } => date.weekday() == *weekday,
        }
    }

    /// First fire time strictly after `now`. Local times that fall into a
    /// DST gap roll to the next eligible day.
    pub fn next_after(&self, now: DateTime<Tz>) -> DateTime<Tz> {
        let tz = now.timezone();
        let mut date = now.date_naive();
        loop {
            if self.matches_day(date) {
                if let Some(naive) = date.and_hms_opt(self.hour(), 0, 0) {
                    if let Some(candidate) = tz.from_local_datetime(&naive).earliest() {
                        if candidate > now {
                            return candidate;
                        }
                    }
                }
            }
            date = date.succ_opt().expect("date overflow");
        }
    }
}

type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type JobFn = Arc<dyn Fn(Arc<AppContext>) -> JobFuture + Send + Sync>;

struct JobHandle {
    class: JobClass,
    recurrence: Recurrence,
    state: Mutex<JobState>,
    /// Single-flight guard; held for the whole run.
    running: Arc<tokio::sync::Mutex<()>>,
    run: JobFn,
}

impl JobHandle {
    fn new(class: JobClass, recurrence: Recurrence, run: JobFn) -> Arc<Self> {
        Arc::new(Self {
            class,
            recurrence,
            state: Mutex::new(JobState::Idle),
            running: Arc::new(tokio::sync::Mutex::new(())),
            run,
        })
    }

    fn state(&self) -> JobState {
        self.state.lock().map(|s| *s).unwrap_or(JobState::Failed)
    }

    fn set_state(&self, next: JobState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    /// Fire the job unless a run is already in flight. Returns the task
    /// handle when dispatched.
    fn dispatch(self: Arc<Self>, ctx: Arc<AppContext>) -> Option<JoinHandle<()>> {
        let guard = match Arc::clone(&self.running).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("{}: already running, start request ignored", self.class.name());
                return None;
            }
        };

        let job = self;
        Some(tokio::spawn(async move {
            let _guard = guard;
            job.set_state(JobState::Running);
            info!("{}: job started", job.class.name());
            match (job.run)(ctx).await {
                Ok(()) => {
                    job.set_state(JobState::Succeeded);
                    info!("{}: job succeeded", job.class.name());
                }
                Err(e) => {
                    job.set_state(JobState::Failed);
                    error!("{}: job failed: {:#}", job.class.name(), e);
                }
            }
        }))
    }
}

pub struct Orchestrator {
    ctx: Arc<AppContext>,
    jobs: Vec<Arc<JobHandle>>,
    shutdown: watch::Sender<bool>,
    driver: Option<JoinHandle<()>>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let schedule = &ctx.config.schedule;
        let jobs = vec![
            JobHandle::new(
                JobClass::SentimentRefresh,
                Recurrence::Weekdays {
                    hour: schedule.sentiment_hour,
                },
                Arc::new(|ctx: Arc<AppContext>| -> JobFuture { Box::pin(jobs::run_sentiment_refresh(ctx)) }),
            ),
            JobHandle::new(
                JobClass::ModelRetrain,
                Recurrence::Weekly {
                    weekday: Weekday::Sat,
                    hour: schedule.retrain_hour,
                },
                Arc::new(|ctx: Arc<AppContext>| -> JobFuture { Box::pin(jobs::run_model_retrain(ctx)) }),
            ),
            JobHandle::new(
                JobClass::TradeCycle,
                Recurrence::Daily {
                    hour: schedule.trade_hour,
                },
                Arc::new(|ctx: Arc<AppContext>| -> JobFuture { Box::pin(jobs::run_trade_cycle(ctx)) }),
            ),
        ];

        let (shutdown, _) = watch::channel(false);
        Self {
            ctx,
            jobs,
            shutdown,
            driver: None,
        }
    }

    /// Spawn the background recurrence driver. Starting twice is a no-op.
    pub fn start(&mut self) {
        if self.driver.is_some() {
            warn!("orchestrator already running");
            return;
        }

        let jobs = self.jobs.clone();
        let ctx = Arc::clone(&self.ctx);
        let rx = self.shutdown.subscribe();
        self.driver = Some(tokio::spawn(drive(jobs, ctx, rx)));
        info!("orchestrator started with {} job classes", self.jobs.len());
    }

    /// Signal shutdown and wait for the driver and any in-flight job, up
    /// to `timeout`. A job that outlives the bound is warned about; its
    /// temp-then-rename writes keep persisted state consistent anyway.
    pub async fn stop(&mut self, timeout: Duration) {
        let Some(driver) = self.driver.take() else {
            warn!("orchestrator is not running");
            return;
        };

        let _ = self.shutdown.send(true);
        let deadline = tokio::time::Instant::now() + timeout;

        if tokio::time::timeout_at(deadline, driver).await.is_err() {
            warn!("recurrence driver did not stop within {:?}", timeout);
        }

        for job in &self.jobs {
            let lock = Arc::clone(&job.running);
            if tokio::time::timeout_at(deadline, lock.lock_owned())
                .await
                .is_err()
            {
                warn!(
                    "{}: still running at shutdown; termination could not be confirmed",
                    job.class.name()
                );
            }
        }

        let _ = self.shutdown.send(false);
        info!("orchestrator stopped");
    }

    pub fn job_state(&self, class: JobClass) -> Option<JobState> {
        self.jobs
            .iter()
            .find(|j| j.class == class)
            .map(|j| j.state())
    }

    /// Fire one job class immediately (outside its recurrence). Returns
    /// the task handle, or None when that class is already running.
    pub fn trigger(&self, class: JobClass) -> Option<JoinHandle<()>> {
        let job = self.jobs.iter().find(|j| j.class == class)?;
        Arc::clone(job).dispatch(Arc::clone(&self.ctx))
    }
}

async fn drive(jobs: Vec<Arc<JobHandle>>, ctx: Arc<AppContext>, mut rx: watch::Receiver<bool>) {
    let now = Utc::now().with_timezone(&New_York);
    let mut schedule: Vec<DateTime<Tz>> = jobs
        .iter()
        .map(|job| {
            let at = job.recurrence.next_after(now);
            info!("{}: next fire at {}", job.class.name(), at);
            at
        })
        .collect();

    loop {
        let (idx, at) = match schedule
            .iter()
            .copied()
            .enumerate()
            .min_by_key(|(_, at)| *at)
        {
            Some(next) => next,
            None => return,
        };

        let now = Utc::now().with_timezone(&New_York);
        let wait = (at - now).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                Arc::clone(&jobs[idx]).dispatch(Arc::clone(&ctx));
                let basis = Utc::now().with_timezone(&New_York).max(at);
                schedule[idx] = jobs[idx].recurrence.next_after(basis);
                info!("{}: next fire at {}", jobs[idx].class.name(), schedule[idx]);
            }
            changed = rx.changed() => {
                if changed.is_err() || *rx.borrow() {
                    info!("recurrence driver shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Tz> {
        New_York
            .with_ymd_and_hms(y, m, d, h, 0, 0)
            .single()
            .expect("valid local time")
    }

    #[test]
    fn daily_fires_next_day_when_hour_has_passed() {
        let recurrence = Recurrence::Daily { hour: 9 };
        // Wednesday 2024-06-12 10:00 -> Thursday 09:00
        let next = recurrence.next_after(at(2024, 6, 12, 10));
        assert_eq!(next, at(2024, 6, 13, 9));
    }

    #[test]
    fn daily_fires_same_day_before_the_hour() {
        let recurrence = Recurrence::Daily { hour: 9 };
        let next = recurrence.next_after(at(2024, 6, 12, 8));
        assert_eq!(next, at(2024, 6, 12, 9));
    }

    #[test]
    fn weekday_recurrence_skips_weekends() {
        let recurrence = Recurrence::Weekdays { hour: 4 };
        // Friday 2024-06-14 05:00 -> Monday 04:00
        let next = recurrence.next_after(at(2024, 6, 14, 5));
        assert_eq!(next, at(2024, 6, 17, 4));
    }

    #[test]
    fn weekly_recurrence_lands_on_saturday() {
        let recurrence = Recurrence::Weekly {
            weekday: Weekday::Sat,
            hour: 10,
        };
        let next = recurrence.next_after(at(2024, 6, 12, 12));
        assert_eq!(next, at(2024, 6, 15, 10));
        assert_eq!(next.weekday(), Weekday::Sat);
    }

    #[test]
    fn fire_time_is_strictly_after_now() {
        let recurrence = Recurrence::Daily { hour: 9 };
        let now = at(2024, 6, 12, 9);
        let next = recurrence.next_after(now);
        assert!(next > now);
        assert_eq!(next, at(2024, 6, 13, 9));
    }
}
