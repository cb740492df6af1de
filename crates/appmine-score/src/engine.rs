//! Composite ranking and payout computation for one period.
//!
//! [`CompositeEngine::rank`] folds every reviewer report of a period into a
//! per-entry accumulator, averages the weighted scores, blends them with the
//! prior period's memory rankings and sorts. The prior period is ranked by the
//! same function on a strictly earlier key, so the chain ends at the first
//! period without eligible history.
//!
//! [`CompositeEngine::compute`] validates the period's payout configuration
//! and runs the waterfall once per currency over the ranked list.

use std::collections::btree_map::Entry as MapEntry;
use std::collections::BTreeMap;

use appmine_core::amount::{format_number, format_units, format_usd};
use appmine_core::constants::{BTC_DECIMALS, STX_DECIMALS};
use appmine_core::error::{AppMineError, ScoreError};
use appmine_core::projection::{EntryField, EntryProjection};
use appmine_core::traits::PeriodStore;
use appmine_core::types::{Entry, EntryId, Period, PeriodKey};
use serde::Serialize;
use tracing::debug;

use crate::history::resolve_previous;
use crate::memory::{memory_ranking, PriorScore};
use crate::normalize::average_ranking;
use crate::waterfall::{btc_reward, stx_reward, PayoutPlan, Waterfall};

/// One entry's standing in a period, before payouts.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RankedEntry {
    pub entry: Entry,
    /// Raw standardized scores, in report order.
    pub rankings: Vec<f64>,
    /// Score given by each reviewer, keyed by reviewer name.
    pub reviewer_scores: BTreeMap<String, f64>,
    pub average_ranking: f64,
    pub memory_ranking: f64,
    /// Memory ranking the entry carried in the prior period.
    pub previous_score: Option<f64>,
    /// Host name of the entry's website.
    pub domain: Option<String>,
}

/// Ranked entries of one period, best first.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PeriodRanking {
    pub period: Period,
    pub entries: Vec<RankedEntry>,
}

impl PeriodRanking {
    pub fn find(&self, entry_id: EntryId) -> Option<&RankedEntry> {
        self.entries.iter().find(|e| e.entry.id == entry_id)
    }

    /// The entry's scores in this period, as seen by the following period.
    pub fn prior_score(&self, entry_id: EntryId) -> Option<PriorScore> {
        self.find(entry_id).map(|e| PriorScore {
            memory: Some(e.memory_ranking),
            average: e.average_ranking,
        })
    }
}

/// Rewards of one entry. USD in micro-dollars, BTC in satoshis,
/// STX in micro-STX.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct EntryPayout {
    /// USD value of both currency payouts combined.
    pub usd_rewards: u64,
    pub btc_rewards: u64,
    /// `None` when the period has no STX budget.
    pub stx_rewards: Option<u64>,
}

impl EntryPayout {
    pub fn formatted_usd_rewards(&self) -> String {
        format_usd(self.usd_rewards)
    }

    pub fn formatted_btc_rewards(&self) -> String {
        format_units(self.btc_rewards, BTC_DECIMALS)
    }

    pub fn formatted_stx_rewards(&self) -> Option<String> {
        self.stx_rewards.map(|v| format_number(v, STX_DECIMALS))
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CompositeResult {
    #[serde(flatten)]
    pub ranked: RankedEntry,
    pub payout: EntryPayout,
}

/// Full result for a period: ranking, payouts and undistributed budgets.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Composite {
    pub period: Period,
    pub results: Vec<CompositeResult>,
    /// Micro-dollars left in the BTC pool after the last entry.
    pub btc_remaining: u64,
    pub stx_remaining: Option<u64>,
}

impl Composite {
    /// Run the waterfall of every currency in `plan` over `ranking`.
    pub fn allocate(ranking: PeriodRanking, plan: &PayoutPlan) -> Self {
        let mut btc = Waterfall::new(plan.btc.budget, plan.btc.decay);
        let mut stx = plan.stx.map(|p| (p, Waterfall::new(p.budget, p.decay)));

        let results = ranking
            .entries
            .into_iter()
            .map(|ranked| {
                let btc_usd = btc.next_payout();
                let mut payout = EntryPayout {
                    usd_rewards: btc_usd,
                    btc_rewards: btc_reward(btc_usd, plan.btc.rate),
                    stx_rewards: None,
                };
                if let Some((stx_plan, waterfall)) = stx.as_mut() {
                    let stx_usd = waterfall.next_payout();
                    payout.usd_rewards += stx_usd;
                    payout.stx_rewards = Some(stx_reward(stx_usd, stx_plan.rate));
                }
                CompositeResult { ranked, payout }
            })
            .collect();

        Self {
            period: ranking.period,
            results,
            btc_remaining: btc.remaining(),
            stx_remaining: stx.map(|(_, w)| w.remaining()),
        }
    }

    pub fn find(&self, entry_id: EntryId) -> Option<&CompositeResult> {
        self.results.iter().find(|r| r.ranked.entry.id == entry_id)
    }
}

/// Per-entry fold state while walking a period's reports.
struct Accumulator {
    entry: Entry,
    rankings: Vec<f64>,
    reviewer_scores: BTreeMap<String, f64>,
}

impl Accumulator {
    fn new(entry: Entry) -> Self {
        Self {
            entry,
            rankings: Vec::new(),
            reviewer_scores: BTreeMap::new(),
        }
    }

    fn push(&mut self, reviewer: &str, score: f64) {
        self.rankings.push(score);
        self.reviewer_scores.insert(reviewer.to_owned(), score);
    }

    fn finish(
        self,
        key: PeriodKey,
        previous: Option<&PeriodRanking>,
    ) -> Result<RankedEntry, ScoreError> {
        let average = average_ranking(self.entry.id, &self.rankings)?;
        let prior = previous.and_then(|p| p.prior_score(self.entry.id));
        let memory = memory_ranking(key, average, prior);
        Ok(RankedEntry {
            domain: domain_of(self.entry.website.as_deref()),
            previous_score: prior.and_then(|p| p.memory),
            average_ranking: average,
            memory_ranking: memory,
            rankings: self.rankings,
            reviewer_scores: self.reviewer_scores,
            entry: self.entry,
        })
    }
}

fn domain_of(website: Option<&str>) -> Option<String> {
    let url = url::Url::parse(website?).ok()?;
    url.host_str().map(str::to_owned)
}

/// Computes rankings and payouts against a [`PeriodStore`].
pub struct CompositeEngine<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> CompositeEngine<'a, S>
where
    S: PeriodStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Ranked entries of `key`, best memory ranking first.
    ///
    /// Ties keep ascending entry-id order.
    pub fn rank(&self, key: PeriodKey) -> Result<PeriodRanking, AppMineError> {
        let projection = EntryProjection::public().with(EntryField::BtcAddress);
        let snapshot = self
            .store
            .load_snapshot(key, &projection)?
            .ok_or(AppMineError::PeriodNotFound(key))?;

        let previous = match resolve_previous(self.store, key)? {
            Some(prior) => Some(self.rank(prior.key)?),
            None => None,
        };

        let mut accumulators: BTreeMap<EntryId, Accumulator> = BTreeMap::new();
        for report in &snapshot.reports {
            for ranking in &report.rankings {
                let acc = match accumulators.entry(ranking.entry_id) {
                    MapEntry::Occupied(slot) => slot.into_mut(),
                    MapEntry::Vacant(slot) => {
                        let entry = snapshot.entries.get(&ranking.entry_id).ok_or(
                            ScoreError::UnknownEntry {
                                entry_id: ranking.entry_id,
                            },
                        )?;
                        slot.insert(Accumulator::new(entry.clone()))
                    }
                };
                acc.push(&report.reviewer_name, ranking.standard_score);
            }
        }

        let mut entries = accumulators
            .into_values()
            .map(|acc| acc.finish(key, previous.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by(|a, b| b.memory_ranking.total_cmp(&a.memory_ranking));

        debug!(
            period = %key,
            entries = entries.len(),
            reports = snapshot.reports.len(),
            prior = ?previous.as_ref().map(|p| p.period.key),
            "ranked period"
        );

        Ok(PeriodRanking {
            period: snapshot.period,
            entries,
        })
    }

    /// Ranking plus payouts of `key`.
    ///
    /// The period's payout settings are validated before anything is ranked
    /// or allocated.
    pub fn compute(&self, key: PeriodKey) -> Result<Composite, AppMineError> {
        let period = self
            .store
            .get_period(key)?
            .ok_or(AppMineError::PeriodNotFound(key))?;
        let plan = PayoutPlan::from_period(&period)?;
        let ranking = self.rank(key)?;
        Ok(Composite::allocate(ranking, &plan))
    }
}
