//! The route planner: scores candidate journeys, owns the chosen-route
//! state, and drives the subscription lifecycle events.
//!
//! Each user's lifecycle events are ordered by performing terminate-then-
//! create inside a single operation before it returns.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use optimaldn_common::broker::{BrokerError, Publisher};
use optimaldn_common::routing::{
    EVENT_ROUTE_CREATED, EVENT_ROUTE_TERMINATED, HEADER_EVENT_TYPE, KEY_ROUTE_CREATED,
    KEY_ROUTE_TERMINATED,
};
use optimaldn_common::schema::{
    ActiveSubscription, PerUserDirective, RouteLeg, RouteResult, Status, StatusReply, UserRequest,
    UserRoute, UserSavedRoute,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::scoring::{
    estimate_current_stop, leg_time_band, normalize_stop_id, score, weekday_key, EstimateError,
    LONDON,
};
use crate::state::{RouteStore, StateError};
use crate::stops::StopCodes;
use crate::tfl::{Journey, TflClient, TflError};

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("location '{0}' not found in the stop-code table")]
    UnknownLocation(String),
    #[error("no active route found for user {0}")]
    NoActiveRoute(String),
    #[error("no journeys available from {0} to {1}")]
    NoJourneys(String, String),
    #[error("journey already completed")]
    JourneyCompleted,
    #[error("unable to estimate current position")]
    CannotEstimate,
    #[error("transit API error: {0}")]
    Tfl(#[from] TflError),
    #[error("route state error: {0}")]
    State(#[from] StateError),
    #[error("event publish failed: {0}")]
    Publish(#[from] BrokerError),
}

impl From<EstimateError> for PlannerError {
    fn from(e: EstimateError) -> Self {
        match e {
            EstimateError::JourneyCompleted => PlannerError::JourneyCompleted,
            EstimateError::EmptyRoute | EstimateError::CannotEstimate => {
                PlannerError::CannotEstimate
            }
        }
    }
}

pub struct Planner {
    stops: StopCodes,
    tfl: TflClient,
    store: RouteStore,
    publisher: Publisher,
}

impl Planner {
    pub fn new(stops: StopCodes, tfl: TflClient, store: RouteStore, publisher: Publisher) -> Self {
        Self {
            stops,
            tfl,
            store,
            publisher,
        }
    }

    /// Plan a journey between two named locations, persist it as the user's
    /// active route and announce the new subscription.
    pub async fn serve_request(&self, request: &UserRequest) -> Result<RouteResult, PlannerError> {
        info!(
            user_id = %request.user_id,
            from = %request.start_point,
            to = %request.end_point,
            "route requested"
        );
        let from = self
            .stops
            .resolve(&request.start_point)
            .ok_or_else(|| PlannerError::UnknownLocation(request.start_point.clone()))?;
        let to = self
            .stops
            .resolve(&request.end_point)
            .ok_or_else(|| PlannerError::UnknownLocation(request.end_point.clone()))?;

        let departure = request.departure.with_timezone(&LONDON);
        let (route, best_score) = self
            .find_best(&request.user_id, from, to, departure)
            .await?;
        self.store.put(&route).await?;
        self.publish_event(KEY_ROUTE_CREATED, &route.subscription(), EVENT_ROUTE_CREATED)
            .await?;
        info!(user_id = %request.user_id, score = best_score, "new active route published");

        Ok(RouteResult {
            from: request.start_point.clone(),
            to: request.end_point.clone(),
            score: best_score,
            summary: summarize(&route),
        })
    }

    /// Recalculate from the estimated current position. The old
    /// subscription is terminated, then the replacement route is stored and
    /// announced, all before this returns.
    pub async fn recalculate(
        &self,
        request: &PerUserDirective,
    ) -> Result<RouteResult, PlannerError> {
        info!(user_id = %request.user_id, reason = %request.reason, "recalculation requested");
        let current = self
            .store
            .get(&request.user_id)
            .await?
            .ok_or_else(|| PlannerError::NoActiveRoute(request.user_id.clone()))?;

        self.publish_event(
            KEY_ROUTE_TERMINATED,
            &current.subscription(),
            EVENT_ROUTE_TERMINATED,
        )
        .await?;

        let now = Utc::now().with_timezone(&LONDON);
        let position = estimate_current_stop(&current, now.naive_local())?;
        let destination = current
            .legs
            .last()
            .ok_or(PlannerError::CannotEstimate)?
            .clone();
        info!(
            user_id = %request.user_id,
            current_stop = %position.stop_id,
            destination = %destination.to_id,
            "replanning from estimated position"
        );

        let (route, best_score) = self
            .find_best(&request.user_id, &position.stop_id, &destination.to_id, now)
            .await?;
        self.store.put(&route).await?;
        self.publish_event(KEY_ROUTE_CREATED, &route.subscription(), EVENT_ROUTE_CREATED)
            .await?;

        Ok(RouteResult {
            from: position.stop_name,
            to: destination.to_name,
            score: best_score,
            summary: summarize(&route),
        })
    }

    /// Terminate the active route: announce, then delete the state.
    pub async fn terminate(&self, request: &PerUserDirective) -> Result<StatusReply, PlannerError> {
        info!(user_id = %request.user_id, reason = %request.reason, "termination requested");
        let current = self
            .store
            .get(&request.user_id)
            .await?
            .ok_or_else(|| PlannerError::NoActiveRoute(request.user_id.clone()))?;
        self.publish_event(
            KEY_ROUTE_TERMINATED,
            &current.subscription(),
            EVENT_ROUTE_TERMINATED,
        )
        .await?;
        self.store.delete(&request.user_id).await?;
        Ok(StatusReply {
            user_id: request.user_id.clone(),
            status: Status::Done,
        })
    }

    /// Re-activate a saved favorite: materialize a route for it and
    /// announce the owner's subscription to the saved lines.
    pub async fn accept_saved(&self, saved: &UserSavedRoute) -> Result<StatusReply, PlannerError> {
        info!(
            user_id = %saved.user_id,
            from = %saved.start_point,
            to = %saved.end_point,
            "saved route accepted"
        );
        let route = route_from_saved(saved);
        self.store.put(&route).await?;
        let subscription = ActiveSubscription {
            user_id: saved.user_id.clone(),
            line_ids: saved.line_names.clone(),
        };
        self.publish_event(KEY_ROUTE_CREATED, &subscription, EVENT_ROUTE_CREATED)
            .await?;
        Ok(StatusReply {
            user_id: saved.user_id.clone(),
            status: Status::Done,
        })
    }

    pub async fn get_current(&self, user_id: &str) -> Result<UserRoute, PlannerError> {
        self.store
            .get(user_id)
            .await?
            .ok_or_else(|| PlannerError::NoActiveRoute(user_id.to_string()))
    }

    /// Fetch candidates and pick the lowest-scoring journey; ties keep the
    /// first one encountered.
    async fn find_best(
        &self,
        user_id: &str,
        from: &str,
        to: &str,
        departure: DateTime<Tz>,
    ) -> Result<(UserRoute, f64), PlannerError> {
        let response = self.tfl.fetch_journeys(from, to, departure).await?;
        let weekday = weekday_key(departure.date_naive());

        let mut best: Option<(Journey, f64)> = None;
        for journey in response.journeys {
            let journey_score = self.journey_score(&journey, &weekday).await;
            debug!(
                duration = journey.duration,
                score = journey_score,
                "scored candidate journey"
            );
            if best
                .as_ref()
                .is_none_or(|(_, best_score)| journey_score < *best_score)
            {
                best = Some((journey, journey_score));
            }
        }
        let (journey, best_score) =
            best.ok_or_else(|| PlannerError::NoJourneys(from.to_string(), to.to_string()))?;
        Ok((convert_journey(user_id, &journey), best_score))
    }

    /// Accumulate crowding over every stop of every leg, matched against
    /// the leg's 15-minute arrival band. Stops without a matching band or
    /// with failing lookups simply do not contribute.
    async fn journey_score(&self, journey: &Journey, weekday: &str) -> f64 {
        let mut total_crowding = 0.0;
        let mut stop_count = 0usize;

        for leg in &journey.legs {
            let band = match leg_time_band(&leg.arrival_time) {
                Ok(band) => band,
                Err(e) => {
                    warn!(arrival_time = %leg.arrival_time, error = %e, "unparseable arrival time");
                    continue;
                }
            };
            for stop in &leg.path.stop_points {
                let naptan = normalize_stop_id(&stop.id);
                let crowding = match self.tfl.fetch_crowding(&naptan, weekday).await {
                    Ok(crowding) => crowding,
                    Err(e) => {
                        debug!(stop = %naptan, error = %e, "crowding lookup failed");
                        continue;
                    }
                };
                if let Some(time_band) = crowding
                    .time_bands
                    .iter()
                    .find(|time_band| time_band.time_band == band)
                {
                    total_crowding += time_band.percentage_of_base_line;
                    stop_count += 1;
                }
            }
        }

        score(total_crowding, stop_count, journey.duration)
    }

    async fn publish_event(
        &self,
        routing_key: &str,
        subscription: &ActiveSubscription,
        event_type: &str,
    ) -> Result<(), BrokerError> {
        self.publisher
            .publish_json(routing_key, subscription, (HEADER_EVENT_TYPE, event_type))
            .await
    }
}

/// Flatten a TfL journey into the stored route shape.
pub(crate) fn convert_journey(user_id: &str, journey: &Journey) -> UserRoute {
    let legs: Vec<RouteLeg> = journey
        .legs
        .iter()
        .map(|leg| {
            let (line_name, line_id) = leg
                .route_options
                .first()
                .map(|option| {
                    (
                        option.line_identifier.name.clone(),
                        option.line_identifier.id.clone(),
                    )
                })
                .unwrap_or_default();
            RouteLeg {
                from_name: leg.departure_point.common_name.clone(),
                from_id: leg.departure_point.naptan_id.clone(),
                to_name: leg.arrival_point.common_name.clone(),
                to_id: leg.arrival_point.naptan_id.clone(),
                mode: leg.mode.name.clone(),
                start_time: leg.departure_time.clone(),
                end_time: leg.arrival_time.clone(),
                description: leg.instruction.detailed.clone(),
                line_name,
                line_id,
                stops: leg.path.stop_points.iter().map(|s| s.name.clone()).collect(),
                stop_ids: leg.path.stop_points.iter().map(|s| s.id.clone()).collect(),
            }
        })
        .collect();

    UserRoute {
        user_id: user_id.to_string(),
        total_duration: journey.duration,
        description: format!("Journey with {} legs", legs.len()),
        legs,
    }
}

/// One detailed instruction per leg, joined with " → ".
pub(crate) fn summarize(route: &UserRoute) -> String {
    route
        .legs
        .iter()
        .map(|leg| leg.description.as_str())
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Materialize a stored route from a saved favorite: one leg per line, with
/// the recorded stop names.
pub(crate) fn route_from_saved(saved: &UserSavedRoute) -> UserRoute {
    let description = format!(
        "{} → {} via {}",
        saved.start_point,
        saved.end_point,
        saved.line_names.join(", ")
    );
    let legs: Vec<RouteLeg> = saved
        .line_names
        .iter()
        .enumerate()
        .map(|(i, line)| RouteLeg {
            from_name: saved.start_point.clone(),
            to_name: saved.end_point.clone(),
            mode: saved.transport_mode.clone(),
            description: format!("{} via {}", saved.start_point, line),
            line_name: line.clone(),
            stops: saved.stops_names.get(i).cloned().into_iter().collect(),
            ..RouteLeg::default()
        })
        .collect();

    UserRoute {
        user_id: saved.user_id.clone(),
        total_duration: saved.estimated_time,
        description,
        legs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tfl::{
        Instruction, JourneyLeg, LineIdentifier, Mode, PathInfo, RouteOption, StopPoint,
        StopPointRef,
    };
    use uuid::Uuid;

    fn sample_journey() -> Journey {
        Journey {
            duration: 25,
            legs: vec![
                JourneyLeg {
                    departure_time: "2025-06-01T08:30:00".into(),
                    arrival_time: "2025-06-01T08:40:00".into(),
                    departure_point: StopPoint {
                        common_name: "Waterloo".into(),
                        naptan_id: "940GZZLUWLO".into(),
                    },
                    arrival_point: StopPoint {
                        common_name: "London Bridge".into(),
                        naptan_id: "940GZZLULNB".into(),
                    },
                    instruction: Instruction {
                        summary: "Jubilee line to London Bridge".into(),
                        detailed: "Jubilee line towards Stratford".into(),
                    },
                    route_options: vec![RouteOption {
                        name: "Jubilee".into(),
                        line_identifier: LineIdentifier {
                            id: "jubilee".into(),
                            name: "Jubilee".into(),
                        },
                    }],
                    path: PathInfo {
                        stop_points: vec![
                            StopPointRef {
                                id: "940GZZLUWLO".into(),
                                name: "Waterloo".into(),
                            },
                            StopPointRef {
                                id: "940GZZLULNB".into(),
                                name: "London Bridge".into(),
                            },
                        ],
                    },
                    mode: Mode {
                        name: "tube".into(),
                    },
                },
                JourneyLeg {
                    departure_time: "2025-06-01T08:42:00".into(),
                    arrival_time: "2025-06-01T08:50:00".into(),
                    departure_point: StopPoint {
                        common_name: "London Bridge".into(),
                        naptan_id: "940GZZLULNB".into(),
                    },
                    arrival_point: StopPoint {
                        common_name: "Bank".into(),
                        naptan_id: "940GZZLUBNK".into(),
                    },
                    instruction: Instruction {
                        summary: "Northern line to Bank".into(),
                        detailed: "Northern line towards Edgware".into(),
                    },
                    route_options: vec![RouteOption {
                        name: "Northern".into(),
                        line_identifier: LineIdentifier {
                            id: "northern".into(),
                            name: "Northern".into(),
                        },
                    }],
                    path: PathInfo {
                        stop_points: vec![StopPointRef {
                            id: "940GZZLUBNK".into(),
                            name: "Bank".into(),
                        }],
                    },
                    mode: Mode {
                        name: "tube".into(),
                    },
                },
            ],
        }
    }

    #[test]
    fn converted_route_preserves_leg_structure() {
        let route = convert_journey("alice", &sample_journey());
        assert_eq!(route.user_id, "alice");
        assert_eq!(route.total_duration, 25);
        assert_eq!(route.description, "Journey with 2 legs");
        assert_eq!(route.legs.len(), 2);

        let first = &route.legs[0];
        assert_eq!(first.from_id, "940GZZLUWLO");
        assert_eq!(first.to_id, "940GZZLULNB");
        assert_eq!(first.line_name, "Jubilee");
        assert_eq!(first.line_id, "jubilee");
        assert_eq!(first.stops.len(), first.stop_ids.len());
        // consecutive legs chain at the interchange
        assert_eq!(route.legs[0].to_id, route.legs[1].from_id);
    }

    #[test]
    fn converted_route_projects_to_distinct_lines() {
        let route = convert_journey("alice", &sample_journey());
        let subscription = route.subscription();
        assert_eq!(subscription.line_ids, vec!["Jubilee", "Northern"]);
    }

    #[test]
    fn summary_joins_detailed_instructions() {
        let route = convert_journey("alice", &sample_journey());
        assert_eq!(
            summarize(&route),
            "Jubilee line towards Stratford → Northern line towards Edgware"
        );
    }

    #[test]
    fn saved_route_materializes_one_leg_per_line() {
        let saved = UserSavedRoute {
            route_id: Uuid::nil(),
            user_id: "alice".into(),
            start_point: "Waterloo".into(),
            end_point: "Bank".into(),
            transport_mode: "tube".into(),
            stops: 2,
            estimated_time: 25,
            line_names: vec!["Jubilee".into(), "Northern".into()],
            stops_names: vec!["Waterloo".into(), "Bank".into()],
        };
        let route = route_from_saved(&saved);
        assert_eq!(route.total_duration, 25);
        assert_eq!(route.legs.len(), 2);
        assert_eq!(route.legs[0].line_name, "Jubilee");
        assert_eq!(route.legs[1].line_name, "Northern");
        assert_eq!(route.description, "Waterloo → Bank via Jubilee, Northern");
        assert_eq!(
            route.subscription().line_ids,
            vec!["Jubilee", "Northern"]
        );
    }
}
