use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A student's point total before ranking.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Standing {
    pub student_id: i64,
    pub name: String,
    pub unique_id: String,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub student_id: i64,
    pub name: String,
    pub unique_id: String,
    pub points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalLeaderboard {
    pub top: Vec<LeaderboardEntry>,
    pub own_rank: Option<i64>,
    pub own_entry: Option<LeaderboardEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRank {
    pub group_id: i64,
    pub group_title: String,
    pub course_id: i64,
    pub course_title: String,
    pub rank: i64,
    pub points: i64,
    pub total_students: i64,
}

#[derive(Debug, Clone)]
pub struct GroupRef {
    pub group_id: i64,
    pub group_title: String,
    pub course_id: i64,
    pub course_title: String,
}

/// Orders by points, highest first. Ties keep their incoming order.
pub fn rank(mut standings: Vec<Standing>) -> Vec<LeaderboardEntry> {
    standings.sort_by(|a, b| b.points.cmp(&a.points));
    standings
        .into_iter()
        .enumerate()
        .map(|(idx, s)| LeaderboardEntry {
            rank: idx as i64 + 1,
            student_id: s.student_id,
            name: s.name,
            unique_id: s.unique_id,
            points: s.points,
        })
        .collect()
}

pub fn rank_of(entries: &[LeaderboardEntry], student_id: i64) -> Option<i64> {
    entries
        .iter()
        .find(|e| e.student_id == student_id)
        .map(|e| e.rank)
}

fn entry_at(entries: &[LeaderboardEntry], rank: i64) -> Option<&LeaderboardEntry> {
    entries.get(usize::try_from(rank - 1).ok()?)
}

pub fn global(standings: Vec<Standing>, top_n: usize, requester: Option<i64>) -> GlobalLeaderboard {
    let ranked = rank(standings);

    let own_rank = requester.and_then(|id| rank_of(&ranked, id));
    let own_entry = own_rank.and_then(|r| entry_at(&ranked, r).cloned());

    let top = ranked.into_iter().take(top_n).collect();

    GlobalLeaderboard {
        top,
        own_rank,
        own_entry,
    }
}

pub fn group_rank(group: GroupRef, standings: Vec<Standing>, student_id: i64) -> Option<GroupRank> {
    let ranked = rank(standings);
    let entry = entry_at(&ranked, rank_of(&ranked, student_id)?)?;

    Some(GroupRank {
        group_id: group.group_id,
        group_title: group.group_title,
        course_id: group.course_id,
        course_title: group.course_title,
        rank: entry.rank,
        points: entry.points,
        total_students: ranked.len() as i64,
    })
}

/// Keyed by course id; the first group seen for a course wins.
pub fn ranks_by_course(ranks: Vec<GroupRank>) -> BTreeMap<i64, GroupRank> {
    let mut by_course = BTreeMap::new();
    for rank in ranks {
        by_course.entry(rank.course_id).or_insert(rank);
    }
    by_course
}
