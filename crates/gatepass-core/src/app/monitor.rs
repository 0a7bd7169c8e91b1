//! OverdueMonitor - 返却延滞の監視とエスカレーション
//!
//! # フロー（1 tick）
//! 1. PassStore::overdue(now) で延滞中のパスを取得
//! 2. 延滞日数から段階を決める（0 日はまだ送らない）
//! 3. PassStore::claim_escalation で送信権を取る（24h に 1 回まで）
//! 4. 段階に応じた宛先へ通知
//!
//! 速い周期と遅い周期の 2 本がありますが、どちらも同じ冪等なスキャンです。
//! 送信権の取得がストア側の check-and-set なので、二重送信は起きません。
//! 監視は承認状態を一切変更しません。

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::app::{authenticate, routing};
use crate::config::MonitorSettings;
use crate::domain::actor::{Actor, Role};
use crate::domain::errors::GatePassError;
use crate::domain::escalation::{Escalation, EscalationTier};
use crate::domain::ids::PassId;
use crate::domain::pass::GatePass;
use crate::ports::{Clock, Notifier, OrgDirectory, PassStore};

/// ロールごとに見える延滞件数
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverdueAlarm {
    pub count: usize,
    pub pass_ids: Vec<PassId>,
}

pub struct OverdueMonitor {
    store: Arc<dyn PassStore>,
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn OrgDirectory>,
    clock: Arc<dyn Clock>,
    settings: MonitorSettings,
}

impl OverdueMonitor {
    pub fn new(
        store: Arc<dyn PassStore>,
        notifier: Arc<dyn Notifier>,
        directory: Arc<dyn OrgDirectory>,
        clock: Arc<dyn Clock>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            directory,
            clock,
            settings,
        }
    }

    /// 1 回分のスキャン。送ったエスカレーションを返す
    pub async fn scan_overdue(&self) -> Result<Vec<Escalation>, GatePassError> {
        let now = self.clock.now();
        let throttle = self.settings.throttle();
        let mut sent = Vec::new();

        for pass in self.store.overdue(now).await? {
            let Some(days) = pass.days_overdue(now) else {
                continue;
            };
            let Some(tier) = EscalationTier::for_days_overdue(days) else {
                continue;
            };
            if !self
                .store
                .claim_escalation(pass.id, tier, now, throttle)
                .await?
            {
                debug!(pass_id = %pass.id, %tier, "escalation throttled");
                continue;
            }

            let route = routing::for_escalation(&pass, tier, days);
            let recipients =
                routing::resolve(self.directory.as_ref(), &pass, &route.audiences, None).await;
            routing::deliver_all(self.notifier.as_ref(), &pass, &recipients, &route).await;
            info!(pass_id = %pass.id, %tier, days_overdue = days, recipients = recipients.len(), "overdue escalation sent");

            sent.push(Escalation {
                pass_id: pass.id,
                pass_number: pass.number_str().map(str::to_string),
                tier,
                days_overdue: days,
                recipients,
                at: now,
            });
        }
        Ok(sent)
    }

    /// ロールのスコープで見える延滞パスの件数
    ///
    /// - admin / security: 全件
    /// - store manager: 自倉庫
    /// - department head: 自部門
    /// - requester: 自分が作成したもの
    pub async fn alarm_status(&self, actor: &Actor) -> Result<OverdueAlarm, GatePassError> {
        authenticate(self.directory.as_ref(), actor).await?;
        let now = self.clock.now();
        let visible: Vec<PassId> = self
            .store
            .overdue(now)
            .await?
            .into_iter()
            .filter(|pass| visible_to(actor, pass))
            .map(|pass| pass.id)
            .collect();
        Ok(OverdueAlarm {
            count: visible.len(),
            pass_ids: visible,
        })
    }

    /// 手動リマインダー（スロットルなし）
    pub async fn send_reminder(&self, pass_id: PassId, sender: &Actor) -> Result<(), GatePassError> {
        authenticate(self.directory.as_ref(), sender).await?;
        let pass = self.store.get(pass_id).await?;
        match &sender.role {
            Role::Admin => {}
            Role::DepartmentHead(dept) if *dept == pass.department_id => {}
            _ => {
                return Err(GatePassError::Authorization(
                    "only the department head or an administrator sends reminders".into(),
                ));
            }
        }
        if !pass.is_overdue(self.clock.now()) {
            return Err(GatePassError::Validation(format!(
                "pass {pass_id} is not overdue"
            )));
        }

        let (to_creator, confirmation) = routing::for_manual_reminder(&pass, sender.user_id);
        for route in [to_creator, confirmation] {
            let recipients =
                routing::resolve(self.directory.as_ref(), &pass, &route.audiences, None).await;
            routing::deliver_all(self.notifier.as_ref(), &pass, &recipients, &route).await;
        }
        info!(pass_id = %pass_id, sender = %sender.user_id, "manual reminder sent");
        Ok(())
    }

    /// 監視ループを起動する
    ///
    /// 各周期の最初の tick は 1 周期後（sleep-then-scan）。tick が長引いた場合は
    /// 次の tick を遅らせるだけで、重ねて実行しない。`shutdown` が true になるか
    /// 送信側が drop されると終了する。
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let fast_period = self.settings.fast_interval();
            let slow_period = self.settings.slow_interval();
            let start = Instant::now();
            let mut fast = interval_at(start + fast_period, fast_period);
            let mut slow = interval_at(start + slow_period, slow_period);
            fast.set_missed_tick_behavior(MissedTickBehavior::Delay);
            slow.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                fast_secs = fast_period.as_secs(),
                slow_secs = slow_period.as_secs(),
                "overdue monitor started"
            );
            loop {
                tokio::select! {
                    _ = fast.tick() => self.tick("fast").await,
                    _ = slow.tick() => self.tick("slow").await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("overdue monitor stopped");
        })
    }

    async fn tick(&self, cadence: &'static str) {
        match self.scan_overdue().await {
            Ok(sent) if sent.is_empty() => debug!(cadence, "overdue scan found nothing to send"),
            Ok(sent) => info!(cadence, escalations = sent.len(), "overdue scan complete"),
            Err(e) => warn!(cadence, error = %e, "overdue scan failed; retrying next tick"),
        }
    }
}

fn visible_to(actor: &Actor, pass: &GatePass) -> bool {
    match &actor.role {
        Role::Admin | Role::Security => true,
        Role::StoreManager(location) => pass.store_location.as_ref() == Some(location),
        Role::DepartmentHead(dept) => pass.department_id == *dept,
        Role::Requester => pass.created_by == actor.user_id,
    }
}
